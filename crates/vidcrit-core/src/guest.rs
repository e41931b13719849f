//! Guest identity helpers.
//!
//! Visitors arriving through a share link have no account; they get a
//! cookie-backed session with a generated display name. Resolution is
//! lazy: a session is only created when the visitor first needs one.

use anyhow::anyhow;

use crate::api::GuestSessionApi;
use crate::errors::CoreResult;
use crate::model::GuestSession;

/// Generate a display name of the form `Guest #NNNN` (1000-9999).
pub fn generate_guest_name() -> CoreResult<String> {
    let mut buf = [0u8; 2];
    getrandom::fill(&mut buf).map_err(|err| anyhow!("failed to read system entropy: {err}"))?;
    let n = 1000 + u32::from(u16::from_le_bytes(buf)) % 9000;
    Ok(format!("Guest #{n}"))
}

/// Resolve a guest session for `project_id`, reusing a stored cookie token
/// when it still maps to a live session on the same project, otherwise
/// creating a fresh session. A token for a different project is ignored;
/// sessions are scoped to the share link that minted them.
pub fn resolve_or_create_session(
    api: &impl GuestSessionApi,
    project_id: &str,
    stored_token: Option<&str>,
    requested_name: Option<&str>,
) -> CoreResult<GuestSession> {
    if let Some(token) = stored_token {
        if let Some(session) = api.get_session(token)? {
            if session.project_id == project_id {
                return Ok(session);
            }
        }
    }
    let name = match requested_name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => generate_guest_name()?,
    };
    api.create_session(project_id, &name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqliteBackend;

    #[test]
    fn test_generated_name_is_in_range() {
        for _ in 0..32 {
            let name = generate_guest_name().unwrap();
            let digits = name.strip_prefix("Guest #").unwrap();
            let n: u32 = digits.parse().unwrap();
            assert!((1000..=9999).contains(&n), "out of range: {name}");
        }
    }

    #[test]
    fn test_resolve_reuses_live_session() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let project = backend.create_project("Launch cut", false).unwrap();

        let first =
            resolve_or_create_session(&backend, &project.project_id, None, Some("Quinn")).unwrap();
        assert_eq!(first.name, "Quinn");

        let second = resolve_or_create_session(
            &backend,
            &project.project_id,
            Some(&first.cookie_token),
            None,
        )
        .unwrap();
        assert_eq!(second.session_id, first.session_id);
    }

    #[test]
    fn test_resolve_ignores_token_from_other_project() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let project_a = backend.create_project("Cut A", false).unwrap();
        let project_b = backend.create_project("Cut B", false).unwrap();

        let session_a =
            resolve_or_create_session(&backend, &project_a.project_id, None, None).unwrap();
        let session_b = resolve_or_create_session(
            &backend,
            &project_b.project_id,
            Some(&session_a.cookie_token),
            None,
        )
        .unwrap();
        assert_ne!(session_b.session_id, session_a.session_id);
        assert_eq!(session_b.project_id, project_b.project_id);
    }

    #[test]
    fn test_resolve_generates_name_when_blank() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let project = backend.create_project("Launch cut", false).unwrap();

        let session =
            resolve_or_create_session(&backend, &project.project_id, None, Some("   ")).unwrap();
        assert!(session.name.starts_with("Guest #"));
        assert_eq!(session.identity().name, session.name);
    }
}
