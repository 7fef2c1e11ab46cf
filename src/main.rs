use std::net::SocketAddr;

use clap::Parser;
use gatekeeper::cli::{
    Args, build_config, handle_create_admin, init_logging, load_jwt_secret, open_database,
    print_service_token, validate_public_url,
};
use gatekeeper::{create_app, init_cleanup};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    if args.print_service_token {
        print_service_token(&jwt_secret);
        return;
    }

    let Some(public_url) = validate_public_url(&args.public_url, args.environment) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if let Some(email) = args.create_admin.as_deref() {
        handle_create_admin(&db, email).await;
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to get local address");
        std::process::exit(1);
    });

    let config = build_config(&args, db, public_url, jwt_secret);
    init_cleanup(&config).await;
    let app = create_app(&config);

    info!(
        address = %local_addr,
        environment = ?args.environment,
        strict_auth = args.strict_auth,
        "Listening"
    );

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
