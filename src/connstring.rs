//! Connection string parsing for driver configuration.
use Error::ArgumentError;
use Result;

/// The port a MongoDB server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 27017;

const URI_SCHEME: &'static str = "mongodb://";

/// Connection configuration parsed from a MongoDB connection string of the
/// form `mongodb://host[:port][/database]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
}

impl ConnectionString {
    /// Creates a configuration for a single known host and port.
    pub fn new(host: &str, port: u16) -> ConnectionString {
        ConnectionString {
            host: String::from(host),
            port: port,
            database: None,
        }
    }
}

/// Parses a MongoDB connection string URI.
pub fn parse(uri: &str) -> Result<ConnectionString> {
    if !uri.starts_with(URI_SCHEME) {
        return Err(ArgumentError(
            String::from("MongoDB connection string must start with 'mongodb://'."),
        ));
    }

    let rest = &uri[URI_SCHEME.len()..];
    let (address, database) = match rest.find('/') {
        Some(idx) => (&rest[..idx], Some(String::from(&rest[idx + 1..]))),
        None => (rest, None),
    };

    let mut parts = address.splitn(2, ':');
    let host = match parts.next() {
        Some(host) if !host.is_empty() => String::from(host),
        _ => {
            return Err(ArgumentError(
                String::from("MongoDB connection string is missing a host name."),
            ))
        }
    };

    let port = match parts.next() {
        Some(port) => {
            match port.parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    return Err(ArgumentError(
                        format!("Invalid port in connection string: '{}'.", port),
                    ))
                }
            }
        }
        None => DEFAULT_PORT,
    };

    let database = match database {
        Some(ref db) if db.is_empty() => None,
        other => other,
    };

    Ok(ConnectionString {
        host: host,
        port: port,
        database: database,
    })
}
