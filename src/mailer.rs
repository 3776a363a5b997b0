#![cfg(feature = "web")]

use crate::config::MailSettings;
use crate::error::PriceError;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use rand::Rng;

/// Length of generated reset passwords.
pub const RESET_PASSWORD_LENGTH: usize = 8;

/// Outbound message channel used by password reset.
pub trait Notifier: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), PriceError>;
}

pub struct Mailer {
    smtp: SmtpTransport,
    from: Mailbox,
}

impl Mailer {
    /// Build an SMTP relay from settings.
    ///
    /// Fails with [`PriceError::MailerNotConfigured`] when the sender or its
    /// password is missing.
    pub fn new(settings: &MailSettings) -> Result<Self, PriceError> {
        if !settings.is_configured() {
            return Err(PriceError::MailerNotConfigured);
        }
        let sender = settings.sender.clone().unwrap_or_default();
        let password = settings.password.clone().unwrap_or_default();

        let from: Mailbox = sender
            .parse()
            .map_err(|e| PriceError::Config(format!("invalid sender address '{}': {}", sender, e)))?;
        let creds = Credentials::new(sender, password);

        let builder = if settings.smtp_port == 465 {
            SmtpTransport::relay(&settings.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&settings.smtp_host)
        }
        .map_err(|e| PriceError::Mail(e.to_string()))?;

        let smtp = builder.port(settings.smtp_port).credentials(creds).build();
        Ok(Mailer { smtp, from })
    }
}

impl Notifier for Mailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), PriceError> {
        let to: Mailbox = to
            .trim()
            .parse()
            .map_err(|e| PriceError::Mail(format!("invalid recipient: {}", e)))?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| PriceError::Mail(e.to_string()))?;

        self.smtp.send(&email).map_err(|e| PriceError::Mail(e.to_string()))?;
        Ok(())
    }
}

/// Random password of ASCII letters and digits.
pub fn generate_password(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

pub fn reset_mail_body(new_password: &str) -> String {
    format!(
        "Hello,\n\n\
         Your password for the dealer price list has been reset.\n\n\
         New password: {}\n\n\
         Please sign in with this password and change it as soon as possible.\n",
        new_password
    )
}
