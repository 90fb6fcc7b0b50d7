//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Authorization decision daemon
#[derive(Parser, Debug)]
#[command(name = "authd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "AUTHD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides the config file)
    #[arg(long, env = "AUTHD_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "AUTHD_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "AUTHD_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "AUTHD_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "AUTHD_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the server (default)
    Serve,

    /// User management
    #[command(subcommand)]
    User(UserCommand),

    /// Role management
    #[command(subcommand)]
    Role(RoleCommand),

    /// Grant or deny a resource to a user or role
    Grant {
        /// Resource pattern: an exact string or a trailing-* prefix,
        /// e.g. "/home/abhurke/*"
        #[arg(long)]
        resource: String,

        /// Email the grant applies to (wins over --role when both are given)
        #[arg(long)]
        email: Option<String>,

        /// Role name the grant applies to
        #[arg(long)]
        role: Option<String>,

        /// Record a deny rule instead of an allow rule
        #[arg(long)]
        deny: bool,

        /// Expiration date in yyyy-mm-dd format (end of day, UTC)
        #[arg(long)]
        expires: Option<String>,
    },

    /// Evaluate an authorization query locally against the store
    Check {
        /// User email
        #[arg(long)]
        email: String,

        /// User password
        #[arg(long)]
        password: String,

        /// Resource to check access for
        #[arg(long)]
        resource: String,
    },

    /// Certificate tooling
    #[command(subcommand)]
    Tls(TlsCommand),
}

/// User subcommands
#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user
    Add {
        /// User email (the login identifier)
        #[arg(long)]
        email: String,

        /// User password
        #[arg(long)]
        password: String,

        /// Free-form description
        #[arg(long, default_value = "")]
        description: String,

        /// Role name (create one first with `authd role add`)
        #[arg(long)]
        role: String,
    },

    /// Change a user's password
    Passwd {
        /// User email
        #[arg(long)]
        email: String,

        /// Current password
        #[arg(long)]
        password: String,

        /// New password
        #[arg(long)]
        new_password: String,
    },

    /// Expire a user immediately
    Expire {
        /// User email
        #[arg(long)]
        email: String,
    },
}

/// Role subcommands
#[derive(Subcommand, Debug)]
pub enum RoleCommand {
    /// Create a role
    Add {
        /// Role name
        #[arg(long)]
        name: String,
    },

    /// List roles with their ids
    List,
}

/// Certificate subcommands
#[derive(Subcommand, Debug)]
pub enum TlsCommand {
    /// Generate a self-signed CA certificate
    InitCa {
        /// Common Name for the CA
        #[arg(long, default_value = "authd Root CA")]
        cn: String,

        /// Validity period in days
        #[arg(long, default_value_t = 3650)]
        days: u32,

        /// Output directory (writes ca.crt and ca.key)
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Issue a server or client certificate signed by the CA
    Issue {
        /// Common Name. For server certificates use the SNI hostname.
        #[arg(long)]
        cn: String,

        /// DNS Subject Alternative Names (repeatable); defaults to the CN
        #[arg(long = "san-dns")]
        san_dns: Vec<String>,

        /// Validity period in days
        #[arg(long, default_value_t = 365)]
        days: u32,

        /// Path to the CA certificate
        #[arg(long, default_value = "ca.crt")]
        ca_cert: PathBuf,

        /// Path to the CA private key
        #[arg(long, default_value = "ca.key")]
        ca_key: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// File stem for the generated pair (defaults to "server")
        #[arg(long, default_value = "server")]
        stem: String,
    },
}
