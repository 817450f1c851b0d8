//! Route suffixes, appended to the user or auth prefix

/// `POST` user route creating a short URL
pub const SHORTEN: &str = "/shorten";
/// `GET` user route listing the user's URLs
pub const URLS: &str = "/urls";
/// `POST` logout, on both the user and the auth prefix
pub const LOGOUT: &str = "/logout";
/// `POST` auth route creating an account
pub const REGISTER: &str = "/register";
/// `POST` auth route exchanging credentials for a session cookie
pub const LOGIN: &str = "/login";
/// `GET` auth route renewing the session cookie
pub const REFRESH_TOKEN: &str = "/refresh-token";

/// `DELETE` user route for one URL; `id` is percent-encoded as one segment
pub fn url(id: &str) -> String {
    format!("{URLS}/{}", urlencoding::encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_id_stays_one_segment() {
        assert_eq!(url("6650a1"), "/urls/6650a1");
        assert_eq!(url("a/b?c#d"), "/urls/a%2Fb%3Fc%23d");
        assert_eq!(url("x y"), "/urls/x%20y");
    }
}
