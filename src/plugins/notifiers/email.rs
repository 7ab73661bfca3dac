use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::EmailConfig;
use crate::models::{Direction, PriceChange};
use crate::plugins::traits::Notifier;
use crate::utils::error::NotifyError;

const DEFAULT_SENDER: &str = "price-tracker@example.com";

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn parse_address(address: &str) -> Result<Address, NotifyError> {
    address.trim().parse::<Address>().map_err(|e| NotifyError::Address {
        address: address.to_string(),
        message: e.to_string(),
    })
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        if config.to_addresses.is_empty() {
            return Err(NotifyError::Config("no recipients configured".into()));
        }

        // Sender: explicit address, else the SMTP login, else a placeholder
        let sender = config
            .from_address
            .as_deref()
            .or(config.username.as_deref())
            .unwrap_or(DEFAULT_SENDER);
        let from = Mailbox::new(Some(config.from_name.clone()), parse_address(sender)?);

        let to = config
            .to_addresses
            .iter()
            .map(|address| parse_address(address).map(|addr| Mailbox::new(None, addr)))
            .collect::<Result<Vec<_>, _>>()?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
        }
        .port(config.smtp_port)
        .timeout(Some(Duration::from_secs(30)));

        let builder = match &config.username {
            Some(username) => {
                let password = config.resolve_password().ok_or_else(|| {
                    NotifyError::Config(format!(
                        "missing SMTP password for '{}' (set email.password or {})",
                        username, config.password_env_var
                    ))
                })?;
                builder.credentials(Credentials::new(username.clone(), password))
            }
            None => builder,
        };

        debug!(
            server = %config.smtp_server,
            port = config.smtp_port,
            recipients = to.len(),
            "Email notifier configured"
        );

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn format_subject(&self, change: &PriceChange) -> String {
        match change.direction {
            Direction::Decrease => format!("🔔 Price Drop: {} - {}", change.title, change.formatted_new()),
            Direction::Increase => format!("📈 Price Increase: {} - {}", change.title, change.formatted_new()),
        }
    }

    fn format_html_body(&self, change: &PriceChange) -> String {
        let change_class = match change.direction {
            Direction::Decrease => "price-drop",
            Direction::Increase => "price-increase",
        };
        let target = match change.target_price {
            Some(_) if change.target_reached() => {
                "<p class=\"target\"><strong>Target price reached!</strong></p>".to_string()
            }
            Some(target) => format!(
                "<p class=\"target\">Target price: {} {}</p>",
                change.currency,
                crate::utils::price::format_amount(target)
            ),
            None => String::new(),
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .header {{ background: #f0f0f0; padding: 15px; border-radius: 5px; }}
        .product {{ font-size: 18px; font-weight: bold; }}
        .change {{ margin: 15px 0; padding: 10px; border-radius: 5px; }}
        .price-drop {{ background: #e8f5e8; border-left: 4px solid #4CAF50; }}
        .price-increase {{ background: #fff3cd; border-left: 4px solid #ff9800; }}
        .button {{ display: inline-block; padding: 8px 15px; text-decoration: none; border-radius: 3px; background: #007cba; color: white; }}
    </style>
</head>
<body>
    <div class="header">
        <div class="product">{title}</div>
    </div>
    <div class="change {class}">
        <strong>Change:</strong> {old} → {new}<br>
        <strong>Difference:</strong> {delta}
    </div>
    {target}
    <p><a href="{url}" class="button">View Product</a></p>
    <p style="color: #888; font-size: 12px;">Observed at {at}</p>
</body>
</html>
"#,
            title = escape_html(&change.title),
            class = change_class,
            old = change.formatted_old(),
            new = change.formatted_new(),
            delta = change.formatted_delta(),
            target = target,
            url = escape_html(&change.url),
            at = change.observed_at.format("%Y-%m-%d %H:%M UTC"),
        )
    }

    fn format_text_body(&self, change: &PriceChange) -> String {
        let mut text = String::new();

        text.push_str("🔔 PRICESAGE ALERT\n\n");
        text.push_str(&format!("Product: {}\n", change.title));
        text.push_str(&format!("Change: {} → {}\n", change.formatted_old(), change.formatted_new()));
        text.push_str(&format!("Difference: {}\n", change.formatted_delta()));
        if change.target_reached() {
            text.push_str("Target price reached!\n");
        }
        text.push_str(&format!("\nURL: {}\n", change.url));
        text.push_str(&format!("Observed at: {}\n", change.observed_at.format("%Y-%m-%d %H:%M UTC")));

        text
    }

    fn build_message(&self, change: &PriceChange) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(self.format_subject(change));
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        let message = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(header::ContentType::TEXT_PLAIN)
                        .body(self.format_text_body(change)),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(header::ContentType::TEXT_HTML)
                        .body(self.format_html_body(change)),
                ),
        )?;
        Ok(message)
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, change: &PriceChange) -> Result<(), NotifyError> {
        let message = self.build_message(change)?;
        self.transport.send(message).await?;
        info!(
            product_id = %change.product_id,
            recipients = self.to.len(),
            "Sent price alert email"
        );
        Ok(())
    }
}
