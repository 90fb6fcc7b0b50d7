//! authd - authorization decision daemon.
//!
//! Single-shot allow/deny queries over mutually-authenticatable TLS.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use tracing::{error, info};

use authd::{
    authz::{CredentialVerifier, Denial, PolicyEvaluator},
    cli::{Cli, Command, RoleCommand, TlsCommand, UserCommand},
    config::Config,
    protocol::Verdict,
    server::Supervisor,
    server::tls::{CaParams, CertGenerator, LeafCertParams},
    setup_tracing,
    store::{Effect, FileStore},
};

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command.take() {
        Some(Command::User(user_cmd)) => run_user_command(&cli, &user_cmd),
        Some(Command::Role(role_cmd)) => run_role_command(&cli, &role_cmd),
        Some(Command::Grant {
            resource,
            email,
            role,
            deny,
            expires,
        }) => run_grant(
            &cli,
            &resource,
            email.as_deref(),
            role.as_deref(),
            deny,
            expires.as_deref(),
        ),
        Some(Command::Check {
            email,
            password,
            resource,
        }) => run_check(&cli, &email, &password, &resource).await,
        Some(Command::Tls(tls_cmd)) => run_tls_command(&tls_cmd),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Load configuration and apply CLI overrides.
fn load_config(cli: &Cli) -> Result<Config, ExitCode> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            if let Some(ref store) = cli.store {
                config.store.path = store.clone();
            }
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            Err(ExitCode::FAILURE)
        }
    }
}

/// Open the store for an administrative command.
fn open_store(cli: &Cli) -> Result<FileStore, ExitCode> {
    let config = load_config(cli)?;
    FileStore::open(&config.store.path).map_err(|e| {
        error!("Failed to open store: {e}");
        ExitCode::FAILURE
    })
}

/// Run the server
async fn run_server(cli: Cli) -> ExitCode {
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(code) => return code,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        store = %config.store.path.display(),
        "Starting authd"
    );

    let supervisor = match Supervisor::bind(config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = supervisor.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Run user management commands
fn run_user_command(cli: &Cli, cmd: &UserCommand) -> ExitCode {
    let store = match open_store(cli) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let result = match cmd {
        UserCommand::Add {
            email,
            password,
            description,
            role,
        } => store
            .add_user(email, password, description, role)
            .map(|user| println!("User {} created with id {}", user.email, user.user_id)),
        UserCommand::Passwd {
            email,
            password,
            new_password,
        } => store
            .set_password(email, password, new_password)
            .map(|()| println!("Password changed for {email}")),
        UserCommand::Expire { email } => store
            .expire_user(email)
            .map(|()| println!("User {email} expired")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run role management commands
fn run_role_command(cli: &Cli, cmd: &RoleCommand) -> ExitCode {
    let store = match open_store(cli) {
        Ok(store) => store,
        Err(code) => return code,
    };

    match cmd {
        RoleCommand::Add { name } => match store.add_role(name) {
            Ok(role) => {
                println!("Role {} created with id {}", role.name, role.role_id);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ {e}");
                ExitCode::FAILURE
            }
        },
        RoleCommand::List => {
            let roles = store.roles();
            if roles.is_empty() {
                println!("No roles defined.");
            } else {
                for role in roles {
                    println!("{} : {}", role.role_id, role.name);
                }
            }
            ExitCode::SUCCESS
        }
    }
}

/// Record a grant
fn run_grant(
    cli: &Cli,
    resource: &str,
    email: Option<&str>,
    role: Option<&str>,
    deny: bool,
    expires: Option<&str>,
) -> ExitCode {
    let store = match open_store(cli) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let expires_at = match expires.map(parse_expiration).transpose() {
        Ok(value) => value,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let effect = if deny { Effect::Deny } else { Effect::Allow };
    match store.add_grant(resource, email, role, effect, expires_at) {
        Ok(grant) => {
            println!("Grant recorded for {}", grant.resource);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Expiration dates cover the named day fully: yyyy-mm-dd parses to
/// 23:59:59 UTC of that day.
fn parse_expiration(date: &str) -> Result<DateTime<Utc>, String> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| format!("expiration must be yyyy-mm-dd: {e}"))?;
    let end_of_day = day
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| "invalid expiration date".to_string())?;
    Ok(DateTime::from_naive_utc_and_offset(end_of_day, Utc))
}

/// Evaluate a query locally, without a server
async fn run_check(cli: &Cli, email: &str, password: &str, resource: &str) -> ExitCode {
    let store = match open_store(cli) {
        Ok(store) => Arc::new(store),
        Err(code) => return code,
    };

    let verifier = CredentialVerifier::new(store.clone());
    let evaluator = PolicyEvaluator::new(store);

    let verdict = match verifier.verify(email, password).await {
        Ok(identity) => evaluator.evaluate(&identity, resource).verdict,
        Err(_) => Verdict::deny(Denial::WIRE_REASON),
    };

    match serde_json::to_string(&verdict) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    }

    if verdict.authorized {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run certificate tooling
fn run_tls_command(cmd: &TlsCommand) -> ExitCode {
    match cmd {
        TlsCommand::InitCa { cn, days, out } => {
            let params = CaParams {
                cn,
                validity_days: *days,
            };
            match CertGenerator::init_ca(&params)
                .and_then(|ca| CertGenerator::write_to_dir(&ca, out, "ca"))
            {
                Ok(()) => {
                    println!("✅ CA written to {}/ca.crt and {}/ca.key", out.display(), out.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("❌ {e}");
                    ExitCode::FAILURE
                }
            }
        }

        TlsCommand::Issue {
            cn,
            san_dns,
            days,
            ca_cert,
            ca_key,
            out,
            stem,
        } => {
            let ca_cert_pem = match std::fs::read_to_string(ca_cert) {
                Ok(pem) => pem,
                Err(e) => {
                    eprintln!("❌ Cannot read {}: {e}", ca_cert.display());
                    return ExitCode::FAILURE;
                }
            };
            let ca_key_pem = match std::fs::read_to_string(ca_key) {
                Ok(pem) => pem,
                Err(e) => {
                    eprintln!("❌ Cannot read {}: {e}", ca_key.display());
                    return ExitCode::FAILURE;
                }
            };

            let san_dns = if san_dns.is_empty() {
                vec![cn.clone()]
            } else {
                san_dns.clone()
            };
            let params = LeafCertParams {
                cn,
                san_dns,
                validity_days: *days,
            };

            match CertGenerator::issue_leaf(&params, &ca_cert_pem, &ca_key_pem)
                .and_then(|cert| CertGenerator::write_to_dir(&cert, out, stem))
            {
                Ok(()) => {
                    println!(
                        "✅ Certificate written to {}/{stem}.crt and {}/{stem}.key",
                        out.display(),
                        out.display()
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("❌ {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
