use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// SQLite through `--database-url`
    Sqlite,
    /// Process memory, nothing persisted
    Memory,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "user-service", about = "CRUD HTTP service for user records")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "USER_SERVICE_BIND", default_value = "localhost:8088")]
    pub bind: String,

    /// Storage backend
    #[arg(long, env = "USER_SERVICE_STORE", value_enum, default_value_t = StoreKind::Sqlite)]
    pub store: StoreKind,

    /// SQLite connection URL, file databases are created if missing
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite::memory:")]
    pub database_url: String,

    /// Upper bound on pooled SQLite connections
    #[arg(long, env = "USER_SERVICE_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}
