//! Service process command line
//!
//! The image starts uvicorn bound to every interface on the declared port and
//! pointed at the application's ASGI object. The command is kept in exec form
//! so the server is PID 1 and receives signals directly.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const SERVER: &str = "uvicorn";
pub const BIND_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrypoint {
    pub app_module: String,
    pub host: String,
    pub port: u16,
    pub reload: bool,
}

impl Entrypoint {
    pub fn new(app_module: impl Into<String>, port: u16) -> Self {
        Self {
            app_module: app_module.into(),
            host: BIND_HOST.to_string(),
            port,
            reload: false,
        }
    }

    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    /// Exec-form argument vector
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![
            SERVER.to_string(),
            self.app_module.clone(),
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        if self.reload {
            warn!(
                app = %self.app_module,
                "Entrypoint restarts on source changes; do not ship this image to production"
            );
            argv.push("--reload".to_string());
        }
        argv
    }
}

fn flag_value<'a>(argv: &'a [String], flag: &str) -> Option<&'a str> {
    let prefix = format!("{}=", flag);
    argv.iter().enumerate().find_map(|(i, arg)| {
        if arg == flag {
            argv.get(i + 1).map(String::as_str)
        } else {
            arg.strip_prefix(prefix.as_str())
        }
    })
}

/// Port an ASGI server command line listens on, if it names one
pub fn port_of(argv: &[String]) -> Option<u16> {
    flag_value(argv, "--port").and_then(|p| p.parse().ok())
}

/// Host an ASGI server command line binds, if it names one
pub fn host_of(argv: &[String]) -> Option<&str> {
    flag_value(argv, "--host")
}

pub fn reloads(argv: &[String]) -> bool {
    argv.iter().any(|a| a == "--reload")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_argv() {
        let argv = Entrypoint::new("app.main:app", 8000).argv();
        assert_eq!(
            argv,
            strings(&["uvicorn", "app.main:app", "--host", "0.0.0.0", "--port", "8000"])
        );
        assert!(!reloads(&argv));
    }

    #[test]
    fn test_reload_appended_last() {
        let argv = Entrypoint::new("app.main:app", 8000).with_reload(true).argv();
        assert_eq!(argv.last().map(String::as_str), Some("--reload"));
        assert!(reloads(&argv));
    }

    #[test]
    fn test_port_and_host_lookup() {
        let argv = strings(&["uvicorn", "m:app", "--host=127.0.0.1", "--port", "9000"]);
        assert_eq!(port_of(&argv), Some(9000));
        assert_eq!(host_of(&argv), Some("127.0.0.1"));

        let argv = strings(&["uvicorn", "m:app", "--port"]);
        assert_eq!(port_of(&argv), None);
        assert_eq!(host_of(&argv), None);
    }
}
