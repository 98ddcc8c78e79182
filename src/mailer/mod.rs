//! Outbound mail over SMTP.
//!
//! Messages are plain values ([`OutgoingEmail`]) so their content can be
//! checked without a relay; [`Mailer`] only exists when an SMTP host is set.

use crate::config::SmtpConfig;
use crate::error::AppError;
use chrono::NaiveDate;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    pub fn build(&self, from: &Mailbox) -> Result<Message, AppError> {
        let to: Mailbox = self
            .to
            .parse()
            .map_err(|e| AppError::ValidationError(format!("Invalid recipient address: {}", e)))?;

        Message::builder()
            .from(from.clone())
            .to(to)
            .subject(self.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(self.body.clone())
            .map_err(|e| AppError::InternalError(format!("Failed to build email: {}", e)))
    }
}

pub fn welcome_email(to: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Welcome to Estatehub".to_string(),
        body: "Thanks for subscribing! You'll be the first to hear about new listings.\n\n\
               To unsubscribe, reply to this email or use the link in any newsletter."
            .to_string(),
    }
}

pub fn booking_confirmation(
    to: &str,
    guest_name: &str,
    property_title: &str,
    start: NaiveDate,
    end: NaiveDate,
    total_price: f64,
) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Your booking at {} is confirmed", property_title),
        body: format!(
            "Hi {},\n\nYour stay at {} from {} to {} is confirmed.\nTotal paid: {:.2}\n\nEnjoy your trip!",
            guest_name, property_title, start, end, total_price
        ),
    }
}

pub fn purchase_confirmation(to: &str, buyer_name: &str, property_title: &str, total_price: f64) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Your purchase of {} is confirmed", property_title),
        body: format!(
            "Hi {},\n\nYour payment of {:.2} for {} has been received. The owner will be in touch about the next steps.",
            buyer_name, total_price, property_title
        ),
    }
}

pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    /// `Ok(None)` when no SMTP host is configured.
    pub fn from_settings(config: &SmtpConfig) -> Result<Option<Self>, AppError> {
        if config.host.is_empty() {
            return Ok(None);
        }

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid smtp.from address: {}", e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::ConfigError(format!("Invalid SMTP relay: {}", e)))?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username.clone(), config.password.clone()));
        }

        Ok(Some(Self {
            transport: builder.build(),
            from,
        }))
    }

    pub async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        let message = email.build(&self.from)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::External(format!("SMTP send failed: {}", e)))?;
        info!("Sent \"{}\" to {}", email.subject, email.to);
        Ok(())
    }
}

/// Sends off the request path; failures are logged, never surfaced.
pub fn send_in_background(mailer: Option<Arc<Mailer>>, email: OutgoingEmail) {
    let Some(mailer) = mailer else {
        info!("Mail disabled, skipping \"{}\" to {}", email.subject, email.to);
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&email).await {
            error!("Failed to send \"{}\" to {}: {}", email.subject, email.to, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp(host: &str) -> SmtpConfig {
        SmtpConfig {
            host: host.into(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: "Estatehub <no-reply@estatehub.local>".into(),
        }
    }

    #[test]
    fn test_disabled_without_host() {
        assert!(Mailer::from_settings(&smtp("")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enabled_with_host() {
        assert!(Mailer::from_settings(&smtp("smtp.example.com")).unwrap().is_some());
    }

    #[test]
    fn test_booking_confirmation_content() {
        let email = booking_confirmation(
            "guest@example.com",
            "Jane",
            "Sea view flat",
            NaiveDate::from_ymd_opt(2030, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2030, 7, 4).unwrap(),
            450.0,
        );
        assert_eq!(email.subject, "Your booking at Sea view flat is confirmed");
        assert!(email.body.contains("2030-07-01"));
        assert!(email.body.contains("450.00"));
    }

    #[test]
    fn test_build_rejects_bad_recipient() {
        let from: Mailbox = "Estatehub <no-reply@estatehub.local>".parse().unwrap();
        let mut email = welcome_email("reader@example.com");
        assert!(email.build(&from).is_ok());

        email.to = "not an address".into();
        assert!(matches!(email.build(&from), Err(AppError::ValidationError(_))));
    }
}
