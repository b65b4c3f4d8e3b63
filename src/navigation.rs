//! Redirects issued by the session.
//!
//! The session never renders anything itself. When it ends, it asks a
//! [`Navigator`] to take the user to the anonymous entry point.

/// Receives redirect requests from the session.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator for headless use: redirects are only logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: &str) {
        info!("navigating to {route}");
    }
}
