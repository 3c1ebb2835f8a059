use odo_config::OdoConfig;

/// Emit warnings for likely mistyped env var keys that silently fell back to defaults.
pub fn warn_unconfigured(config: &OdoConfig) {
    for warning in collect_unconfigured_warnings(config, std::env::vars()) {
        tracing::warn!("{warning}");
    }
}

fn collect_unconfigured_warnings<I>(config: &OdoConfig, env: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let env_keys = env.into_iter().map(|(key, _)| key).collect::<Vec<_>>();
    let mut warnings = Vec::new();

    if !config.backend.is_configured() && has_env_prefix(&env_keys, "ODONTO_BACKEND") {
        warnings.push(
            "Backend config appears default while ODONTO_BACKEND* env vars exist. Use double underscores (example: ODONTO_BACKEND__URL)."
                .to_string(),
        );
    }

    if let Some(key) = single_underscore_key(&env_keys, "ODONTO_SESSION") {
        warnings.push(format!(
            "{key} is ignored. Session settings need double underscores (example: ODONTO_SESSION__DURATION_HOURS)."
        ));
    }

    warnings
}

fn has_env_prefix(keys: &[String], prefix: &str) -> bool {
    keys.iter().any(|key| key.starts_with(prefix))
}

fn single_underscore_key<'a>(keys: &'a [String], section: &str) -> Option<&'a str> {
    keys.iter()
        .map(String::as_str)
        .find(|key| {
            key.strip_prefix(section)
                .is_some_and(|rest| rest.starts_with('_') && !rest.starts_with("__"))
        })
}
