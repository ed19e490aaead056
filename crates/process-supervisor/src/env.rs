//! Child environment construction

/// Overlay `KEY=VALUE` entries onto a base environment.
///
/// Existing keys are replaced in place and new keys appended, so the last
/// entry for a key wins. Entries without `=` are ignored.
pub fn overlay<I>(base: I, entries: &[String]) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: Vec<(String, String)> = base.into_iter().collect();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            tracing::debug!(entry = %entry, "Ignoring environment entry without '='");
            continue;
        };
        match env.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => env.push((key.to_string(), value.to_string())),
        }
    }
    env
}

/// Overlay entries onto the current process environment
pub fn inherit(entries: &[String]) -> Vec<(String, String)> {
    let base = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    overlay(base, entries)
}
