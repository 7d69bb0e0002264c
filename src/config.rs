use std::fmt;

use crate::notification::connector::{BotCredentials, DEFAULT_TOKEN_URL, DEFAULT_TRUSTED_HOSTS};

pub struct Config {
    pub port: u16,
    /// Connection string for the conversation registry.
    pub database_url: String,
    pub reference_table: String,
    /// Full URL of the decision-processing endpoint.
    pub function_url: String,
    /// Access key the bot sends to, and the decision endpoint expects from,
    /// `x-functions-key`. Never logged.
    pub function_key: Option<String>,
    pub app_id: Option<String>,
    pub app_password: Option<String>,
    pub token_url: String,
    /// `serviceUrl` hosts that may receive the outbound bearer token.
    pub trusted_hosts: Vec<String>,
    /// Delete a conversation's entry when the bot is uninstalled from it.
    pub prune_on_uninstall: bool,
    pub production: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "****");
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("reference_table", &self.reference_table)
            .field("function_url", &self.function_url)
            .field("function_key", &redact(&self.function_key))
            .field("app_id", &self.app_id)
            .field("app_password", &redact(&self.app_password))
            .field("token_url", &self.token_url)
            .field("trusted_hosts", &self.trusted_hosts)
            .field("prune_on_uninstall", &self.prune_on_uninstall)
            .field("production", &self.production)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Credentials for outbound messages, when both halves are configured.
    pub fn bot_credentials(&self) -> Option<BotCredentials> {
        match (&self.app_id, &self.app_password) {
            (Some(app_id), Some(app_password)) => Some(BotCredentials {
                app_id: app_id.clone(),
                app_password: app_password.clone(),
            }),
            _ => None,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let env_mode = std::env::var("APP_ENV")
        .or_else(|_| std::env::var("RUST_ENV"))
        .unwrap_or_default();

    Ok(Config {
        port: std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3978),
        database_url: non_empty("AZURE_STORAGE_CONNECTION_STRING")
            .or_else(|| non_empty("DATABASE_URL"))
            .unwrap_or_else(|| "postgres://localhost/approval_relay".into()),
        reference_table: non_empty("REFERENCE_TABLE")
            .unwrap_or_else(|| "conversationreferences".into()),
        function_url: non_empty("FUNCTIONAPP_URL")
            .unwrap_or_else(|| "http://localhost:7071/api/handleapproval".into()),
        function_key: non_empty("FUNCTIONAPP_KEY"),
        app_id: non_empty("MICROSOFT_APP_ID"),
        app_password: non_empty("MICROSOFT_APP_PASSWORD"),
        token_url: non_empty("BOT_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into()),
        trusted_hosts: non_empty("BOT_TRUSTED_HOSTS")
            .map(|v| parse_list(&v))
            .unwrap_or_else(|| DEFAULT_TRUSTED_HOSTS.iter().map(|h| h.to_string()).collect()),
        prune_on_uninstall: std::env::var("PRUNE_ON_UNINSTALL")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(true),
        production: env_mode == "production",
    })
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("OFF"));
        assert!(!parse_flag("0"));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" smba.trafficmanager.net, *.botframework.com ,,"),
            vec!["smba.trafficmanager.net", "*.botframework.com"]
        );
    }

    #[test]
    fn test_bot_credentials_need_both_halves() {
        let mut cfg = Config {
            port: 3978,
            database_url: String::new(),
            reference_table: "conversationreferences".into(),
            function_url: String::new(),
            function_key: None,
            app_id: Some("app".into()),
            app_password: None,
            token_url: DEFAULT_TOKEN_URL.into(),
            trusted_hosts: Vec::new(),
            prune_on_uninstall: true,
            production: false,
        };
        assert!(cfg.bot_credentials().is_none());

        cfg.app_password = Some("secret".into());
        let creds = cfg.bot_credentials().unwrap();
        assert_eq!(creds.app_id, "app");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = Config {
            port: 1,
            database_url: "postgres://user:dbpass@db/relay".into(),
            reference_table: "t".into(),
            function_url: String::new(),
            function_key: Some("fn-secret".into()),
            app_id: None,
            app_password: Some("app-secret".into()),
            token_url: String::new(),
            trusted_hosts: Vec::new(),
            prune_on_uninstall: false,
            production: false,
        };
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("fn-secret"));
        assert!(!debug.contains("app-secret"));
        assert!(!debug.contains("dbpass"));
    }
}
