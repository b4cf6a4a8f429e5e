use clap::Parser;
use chirpy::SessionService;
use chirpy::cli::{
    Args, build_settings, init_logging, load_jwt_secret, load_service_key, open_database,
    read_password, run_command,
};
use tracing::error;

fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    // Secrets come out of the environment while the process is still
    // single-threaded. The runtime is only built afterwards.
    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Ok(service_key) = load_service_key(args.service_key_file.as_deref()) else {
        std::process::exit(1);
    };

    let password = if args.command.needs_password() {
        read_password()
    } else {
        None
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let Some(db) = open_database(&args.database).await else {
            std::process::exit(1);
        };

        let settings = build_settings(&args);
        let mut service = SessionService::from_database(&db, jwt_secret.as_bytes(), &settings);
        if let Some(key) = service_key {
            service = service.with_service_key(key);
        }

        run_command(&service, &args.command, move || password).await
    });

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!(error = %e, "Command failed");
            std::process::exit(1);
        }
    }
}
