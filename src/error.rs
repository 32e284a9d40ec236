use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobdropError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Insecure secret file location: {0}")]
    InsecureSecretPath(String),

    #[error("Secret file {0} is empty, refusing to start")]
    EmptySecret(String),

    #[error("Invalid job name: {0:?}")]
    InvalidJobName(String),

    #[error("Could not allocate a job directory for {0}")]
    NameExhausted(String),

    #[error("Failed to launch job {job}: {source}")]
    Launch {
        job: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, JobdropError>;
