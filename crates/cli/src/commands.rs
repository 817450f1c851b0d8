//! CLI commands

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use shortly_http::ShortlyClient;
use shortly_http::types::{RegisterRequest, UrlRecord};
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account
    Register {
        /// Display name
        #[arg(long)]
        name: String,

        /// Account email
        #[arg(long)]
        email: String,

        /// Phone number
        #[arg(long)]
        phone: String,

        /// Account password
        #[arg(long, env = "SHORTLY_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in and keep the session for later commands
    Login {
        /// Account email
        #[arg(long)]
        email: String,

        /// Account password
        #[arg(long, env = "SHORTLY_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log out and forget the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Shorten a URL
    Shorten {
        /// The long URL
        url: String,

        /// Custom alias instead of a generated short code
        #[arg(long)]
        custom: Option<String>,
    },

    /// List your short URLs
    List {
        /// Print the raw records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete one of your short URLs
    Delete {
        /// Record id, as shown by `shortly list`
        id: String,
    },
}

impl Commands {
    /// Whether the command needs a logged-in session before it runs
    pub const fn requires_session(&self) -> bool {
        !matches!(self, Self::Register { .. } | Self::Login { .. })
    }

    pub async fn execute(self, client: &ShortlyClient) -> Result<()> {
        match self {
            Self::Register {
                name,
                email,
                phone,
                password,
            } => {
                let request = RegisterRequest {
                    name,
                    email,
                    phone_number: phone,
                    password,
                };
                let response = client.register(&request).await?;
                println!(
                    "{}",
                    response
                        .message
                        .unwrap_or_else(|| "Account created".to_string())
                );
                println!("Run `shortly login` to start a session.");
                Ok(())
            }
            Self::Login { email, password } => {
                let user = client.login(&email, &password).await?;
                println!("Logged in as {} <{}>", user.name, user.email);
                Ok(())
            }
            Self::Logout => {
                let response = client.logout().await?;
                println!("{}", non_empty(&response.message, "Logged out"));
                Ok(())
            }
            Self::Whoami => {
                let user = client
                    .session()
                    .current()
                    .context("not logged in, run `shortly login`")?;
                println!("{} <{}>", user.name, user.email);
                if let Some(phone) = user.phone_number {
                    println!("phone: {phone}");
                }
                println!("id: {}", user.id);
                Ok(())
            }
            Self::Shorten { url, custom } => {
                if url.trim().is_empty() {
                    bail!("a URL is required");
                }
                let response = client.shorten_url(url.trim(), custom.as_deref()).await?;
                info!(short_code = %response.data.short_code, "Short URL created");
                println!("{}", response.data.short_url);
                Ok(())
            }
            Self::List { json } => {
                let response = client.get_user_urls().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&response.data)?);
                } else if response.data.is_empty() {
                    println!("No short URLs yet.");
                } else {
                    for record in &response.data {
                        println!("{}", format_record(record));
                    }
                }
                Ok(())
            }
            Self::Delete { id } => {
                let response = client.delete_url(&id).await?;
                println!("{}", non_empty(&response.message, "Deleted"));
                Ok(())
            }
        }
    }
}

fn non_empty<'a>(message: &'a str, fallback: &'a str) -> &'a str {
    if message.is_empty() { fallback } else { message }
}

fn format_record(record: &UrlRecord) -> String {
    format!(
        "{}\t{}\t{} clicks\t{}",
        record.id, record.short_url, record.total_clicks, record.long_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_session_requirement() {
        let login = TestCli::parse_from(["shortly", "login", "--email", "a@b.c", "--password", "x"]);
        assert!(!login.command.requires_session());

        let list = TestCli::parse_from(["shortly", "list"]);
        assert!(list.command.requires_session());
    }

    #[test]
    fn test_shorten_parses_custom_alias() {
        let cli = TestCli::parse_from(["shortly", "shorten", "example.com/a", "--custom", "promo"]);
        match cli.command {
            Commands::Shorten { url, custom } => {
                assert_eq!(url, "example.com/a");
                assert_eq!(custom.as_deref(), Some("promo"));
            }
            _ => panic!("expected shorten"),
        }
    }

    #[test]
    fn test_format_record() {
        let record: UrlRecord = serde_json::from_value(serde_json::json!({
            "id": "6650a1",
            "shortUrl": "https://sho.rt/abc123",
            "longUrl": "https://example.com/a",
            "shortCode": "abc123",
            "createdAt": "2024-05-24T10:15:00.000Z",
            "totalClicks": 7
        }))
        .unwrap();
        assert_eq!(
            format_record(&record),
            "6650a1\thttps://sho.rt/abc123\t7 clicks\thttps://example.com/a"
        );
    }

    #[test]
    fn test_non_empty_message() {
        assert_eq!(non_empty("", "Deleted"), "Deleted");
        assert_eq!(non_empty("URL deleted", "Deleted"), "URL deleted");
    }
}
