//! Configuration commands.

use std::path::Path;

use bowwire_protocol::{MAX_NESTING_DEPTH, ROOT_PATH, Record, Value, check_depth};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);

    Ok(())
}

/// Checks settings that parse but cannot work.
pub fn check(config: &ClientConfig) -> ClientResult<()> {
    if config.server.addr.rsplit_once(':').is_none() {
        return Err(ClientError::Config(format!(
            "[server] addr {:?} must be host:port",
            config.server.addr
        )));
    }

    if config.server.timeout == 0 {
        return Err(ClientError::Config(
            "[server] timeout must be at least 1 second".into(),
        ));
    }

    if config.grammar.max_depth == 0 || config.grammar.max_depth > MAX_NESTING_DEPTH {
        return Err(ClientError::Config(format!(
            "[grammar] max_depth must be between 1 and {}",
            MAX_NESTING_DEPTH
        )));
    }

    let paths = config
        .grammar
        .required
        .iter()
        .chain(config.grammar.fields.keys());
    for path in paths {
        if path.is_empty() || path == ROOT_PATH || path.split('.').any(str::is_empty) {
            return Err(ClientError::Config(format!(
                "[grammar] invalid field path {:?}",
                path
            )));
        }
    }

    let mut sample = Record::new();
    for path in &config.grammar.required {
        insert_placeholder(&mut sample, path);
    }
    if let Err(violation) = check_depth(&sample, config.grammar.max_depth) {
        return Err(ClientError::Config(format!(
            "[grammar] required field {} is nested deeper than max_depth {}",
            violation.path, config.grammar.max_depth
        )));
    }

    Ok(())
}

/// Creates the objects leading to `path` and puts a null at its end.
fn insert_placeholder(record: &mut Record, path: &str) {
    match path.split_once('.') {
        None => {
            record.entry(path).or_insert(Value::Null);
        }
        Some((head, rest)) => {
            let child = record
                .entry(head)
                .or_insert_with(|| Value::Object(Record::new()));
            if let Some(child) = child.as_object_mut() {
                insert_placeholder(child, rest);
            }
        }
    }
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    check(config)?;
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: &Path) -> ClientResult<()> {
    println!("config: {}", path.display());
    Ok(())
}
