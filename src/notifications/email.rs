//! Transactional email. Currently only password-reset links.
//!
//! Uses the SMTP settings from the `[email]` config section. When no SMTP host
//! or sender is configured, sends are skipped with a warning.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Link the frontend reset page with `?token=`.
    pub fn reset_link(&self, token: &str) -> String {
        let separator = if self.config.reset_url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.config.reset_url, separator, token)
    }

    pub async fn send_password_reset(
        &self,
        to_email: &str,
        token: &str,
        expires_in_minutes: i64,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(to = %to_email, "Email not configured, skipping password reset email");
            return Ok(());
        }

        let link = self.reset_link(token);
        let subject = format!("Reset your {} password", self.config.from_name);
        let html_body = render_reset_html(&self.config.from_name, &link, expires_in_minutes);
        let text_body = render_reset_text(&self.config.from_name, &link, expires_in_minutes);

        self.send_email(to_email, &subject, &html_body, &text_body).await
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                mailer.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => mailer,
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent");
        Ok(())
    }
}

fn render_reset_html(shop_name: &str, link: &str, expires_in_minutes: i64) -> String {
    let shop_name = html_escape(shop_name);
    let link = html_escape(link);
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="margin:0;padding:24px;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;background:#f5f5f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0">
    <tr><td align="center">
      <table role="presentation" width="480" cellspacing="0" cellpadding="0" style="background:#ffffff;border-radius:8px;padding:32px;">
        <tr><td>
          <h1 style="margin:0 0 16px;font-size:20px;color:#111;">Reset your password</h1>
          <p style="margin:0 0 24px;color:#444;line-height:1.5;">
            We received a request to reset the password for your {shop_name} account.
            The link below is valid for {expires_in_minutes} minutes and can be used once.
          </p>
          <p style="margin:0 0 24px;">
            <a href="{link}" style="display:inline-block;padding:12px 20px;background:#111;color:#fff;text-decoration:none;border-radius:6px;">Choose a new password</a>
          </p>
          <p style="margin:0;color:#888;font-size:13px;">If you did not ask for this, you can ignore this email.</p>
        </td></tr>
      </table>
    </td></tr>
  </table>
</body>
</html>"#
    )
}

fn render_reset_text(shop_name: &str, link: &str, expires_in_minutes: i64) -> String {
    format!(
        "Reset your password\n\n\
         We received a request to reset the password for your {} account.\n\
         Open this link within {} minutes to choose a new password:\n\n\
         {}\n\n\
         If you did not ask for this, you can ignore this email.\n",
        shop_name, expires_in_minutes, link
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
