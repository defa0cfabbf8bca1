use fathom_domain::error::Error;

/// Map a reqwest error into the capability error taxonomy.
pub(crate) fn from_reqwest(capability: &'static str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::capability(capability, format!("timeout: {e}"))
    } else {
        Error::capability(capability, e.to_string())
    }
}

/// Resolve an API key from the named environment variable.
pub(crate) fn key_from_env(capability: &'static str, var: &str) -> Result<String, Error> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!(
            "{capability}: environment variable {var} is not set"
        ))),
    }
}
