use std::sync::Arc;

use blockbot::channels::ImapSmtpTransport;
use blockbot::config::ConfigStore;
use blockbot::error::{ConfigError, Error, SessionError};
use blockbot::report::ConsoleReporter;
use blockbot::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let store = ConfigStore::from_env();

    // Validate once up front so setup problems surface before the first sleep
    let config = match store.load() {
        Ok(config) => config,
        Err(ConfigError::NotFound(path)) => {
            eprintln!("It seems like you haven't set up blockbot yet.");
            match store.write_template() {
                Ok(()) => eprintln!("  A starter config was written to {}.", path.display()),
                Err(e) => eprintln!("  Could not write a starter config to {}: {e}", path.display()),
            }
            eprintln!("  Fill in your login, servers and blacklist, then run again.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("  Edit {} and run again.", store.path().display());
            std::process::exit(1);
        }
    };

    eprintln!("blockbot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Config: {}", store.path().display());
    eprintln!("   IMAP: {}:{}", config.imap_address, config.imap_port);
    eprintln!("   SMTP: {}:{}", config.smtp_address, config.smtp_port);
    eprintln!("   Folder: {}", config.search_mail_folder);
    eprintln!("   Interval: every {} min", config.update_interval);
    eprintln!("   Blocking: {} entries", config.blacklist.len());
    eprintln!(
        "   Actions: archive={} reply={} delete={}",
        config.save_archive, config.also_reply_to_email, config.block_emails
    );
    eprintln!("   Press Ctrl-C to exit.\n");
    drop(config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });

    let scheduler = Scheduler::new(
        store.clone(),
        Arc::new(ImapSmtpTransport),
        Arc::new(ConsoleReporter),
    );

    match scheduler.run_forever(shutdown_rx).await {
        Ok(()) => {
            eprintln!("\n\nProgram has exited");
            // A pending stdin prompt would otherwise keep the runtime alive
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("{}", remediation(&e, &store));
            std::process::exit(1);
        }
    }
}

/// Operator guidance for a fatal error.
fn remediation(error: &Error, store: &ConfigStore) -> String {
    let edit = format!("Edit {} to correct it and run again.", store.path().display());
    match error {
        Error::Session(SessionError::AuthFailed { .. }) => format!(
            "Login failed! Either the email, password, or IMAP server is wrong.\n\
             If you have 2FA enabled, you will have to generate an app-specific password \
             from your account settings.\n{edit}"
        ),
        Error::Session(SessionError::Connect { .. }) => {
            format!("Looks like the IMAP server address is wrong.\n{edit}")
        }
        _ => edit,
    }
}
