use super::{
    flash::{self, Flash},
    models::{AppState, ProjectContext},
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub const PROJECT_COOKIE: &str = "project";

/// Value of the cookie called `name`, if the request sent one.
pub fn cookie<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all("Cookie")
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// The project this request works on: whatever the browser last picked, as
/// long as it is still one we offer.
#[async_trait]
impl FromRequestParts<AppState> for ProjectContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let chosen = cookie(parts, PROJECT_COOKIE)
            .and_then(|raw| urlencoding::decode(raw).ok())
            .filter(|p| state.config.projects.iter().any(|known| known == p));
        Ok(match chosen {
            Some(project) => ProjectContext::new(&project),
            None => ProjectContext::new(&state.config.default_project),
        })
    }
}

/// The flash message left by the previous response, if any. Handlers that
/// render it are responsible for clearing the cookie.
pub struct IncomingFlash(pub Option<Flash>);

#[async_trait]
impl FromRequestParts<AppState> for IncomingFlash {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let found = cookie(parts, flash::COOKIE_NAME)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| {
                flash::deserialize_flash(&state.config.flash_secret, raw)
                    .map_err(|e| tracing::debug!("dropping flash cookie: {e}"))
                    .ok()
            });
        Ok(IncomingFlash(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(cookie_header: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header("Cookie", cookie_header)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_cookie_lookup() {
        let p = parts("theme=dark; project=other-project;flash=abc:def");
        assert_eq!(cookie(&p, "project"), Some("other-project"));
        assert_eq!(cookie(&p, "flash"), Some("abc:def"));
        assert_eq!(cookie(&p, "session"), None);
    }

    #[test]
    fn test_cookie_name_must_match_exactly() {
        let p = parts("myproject=nope");
        assert_eq!(cookie(&p, "project"), None);
    }
}
