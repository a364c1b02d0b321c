use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "No Cloudflare API tokens found.\n\
        Set one or more CLOUDFLARE_API_TOKEN_<NAME> environment variables, e.g.\n\
        CLOUDFLARE_API_TOKEN_PROD=... CLOUDFLARE_ACCOUNT_ID_PROD=..."
    )]
    NoAccounts,

    #[error("{var} is set but empty. Provide a token or unset the variable")]
    EmptyToken { var: String },

    #[error(
        "Account '{account}' has no account ID and --require-account-id is set.\n\
        Set {var} to the Cloudflare account ID for this token"
    )]
    MissingAccountId { account: String, var: String },

    #[error(
        "Account '{name}' is configured twice ({first} and {second}). \
        Account names are case-insensitive; keep one of the variables"
    )]
    DuplicateAccount {
        name: String,
        first: String,
        second: String,
    },

    #[error("Unknown account '{name}' in --account. Available accounts: {available}")]
    UnknownAccount { name: String, available: String },

    #[error("Invalid {flag} pattern '{pattern}': {source}")]
    InvalidPattern {
        flag: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
