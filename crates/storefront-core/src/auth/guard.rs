//! Access checks run before protected pages or admin operations.

use reqwest::Method;
use tracing::debug;

use super::SessionStore;

/// Path prefixes that always require an administrator
const ADMIN_PREFIXES: [&str; 2] = ["/admin/", "/api/admin/"];

/// API areas that read the signed-in user's own data
const ACCOUNT_PREFIXES: [&str; 2] = ["/api/auth/", "/api/orders"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardOptions {
    pub require_auth: bool,
    pub require_admin: bool,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            require_auth: true,
            require_admin: false,
        }
    }
}

impl GuardOptions {
    pub fn public() -> Self {
        Self {
            require_auth: false,
            require_admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            require_auth: true,
            require_admin: true,
        }
    }

    /// Admin areas require an administrator, everything else only a session
    pub fn for_path(path: &str) -> Self {
        if ADMIN_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
            Self::admin()
        } else {
            Self::default()
        }
    }

    /// Like [`for_path`](Self::for_path) for an API call: catalog reads
    /// are public, account reads and every write need a session.
    pub fn for_request(method: &Method, path: &str) -> Self {
        let options = Self::for_path(path);
        if options.require_admin {
            return options;
        }
        let read = *method == Method::GET || *method == Method::HEAD;
        if read && !ACCOUNT_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
            Self::public()
        } else {
            options
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allowed,
    /// Sent to the login location, which carries the requested path
    LoginRequired { location: String },
    /// Signed in, or profile unknown, but not an administrator
    Forbidden,
}

impl GuardOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardOutcome::Allowed)
    }
}

/// Check access to `requested`, navigating away when it is refused.
pub fn guard(session: &SessionStore, requested: &str, options: GuardOptions) -> GuardOutcome {
    let paths = session.options();

    if options.require_auth && !session.is_authenticated() {
        let location = login_location(&paths.login_path, requested);
        debug!(requested = requested, "Authentication required");
        session.navigator().navigate(&location);
        return GuardOutcome::LoginRequired { location };
    }

    if options.require_admin {
        let is_admin = session
            .user_profile()
            .map(|profile| profile.is_admin)
            .unwrap_or(false);
        if !is_admin {
            debug!(requested = requested, "Administrator rights required");
            session.navigator().navigate(&paths.home_path);
            return GuardOutcome::Forbidden;
        }
    }

    GuardOutcome::Allowed
}

fn login_location(login_path: &str, requested: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(requested.as_bytes()).collect();
    let separator = if login_path.contains('?') { '&' } else { '?' };
    format!("{}{}redirect={}", login_path, separator, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_path() {
        assert_eq!(GuardOptions::for_path("/admin/products.html"), GuardOptions::admin());
        assert_eq!(GuardOptions::for_path("/api/admin/users"), GuardOptions::admin());
        assert_eq!(GuardOptions::for_path("/api/cart"), GuardOptions::default());
        assert!(!GuardOptions::public().require_auth);
    }

    #[test]
    fn test_for_request() {
        assert_eq!(
            GuardOptions::for_request(&Method::GET, "/api/products/"),
            GuardOptions::public()
        );
        assert_eq!(
            GuardOptions::for_request(&Method::HEAD, "/api/products/categories"),
            GuardOptions::public()
        );
        assert_eq!(
            GuardOptions::for_request(&Method::GET, "/api/orders/history"),
            GuardOptions::default()
        );
        assert_eq!(
            GuardOptions::for_request(&Method::GET, "/api/auth/me"),
            GuardOptions::default()
        );
        assert_eq!(
            GuardOptions::for_request(&Method::POST, "/api/products/"),
            GuardOptions::default()
        );
        assert_eq!(
            GuardOptions::for_request(&Method::GET, "/api/admin/users"),
            GuardOptions::admin()
        );
    }

    #[test]
    fn test_login_location_encodes_requested_path() {
        assert_eq!(
            login_location("/pages/login.html", "/admin/products.html"),
            "/pages/login.html?redirect=%2Fadmin%2Fproducts.html"
        );
        assert_eq!(
            login_location("/login?lang=fr", "/checkout"),
            "/login?lang=fr&redirect=%2Fcheckout"
        );
    }
}
