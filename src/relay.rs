use crate::domain::UserEmail;
use secrecy::{ExposeSecret, Secret};

#[derive(Clone, serde::Serialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(s: String) -> Self {
        Self(s)
    }
}

#[derive(serde::Serialize)]
struct SendEmailRequestRecipient<'a> {
    email: &'a str,
    name: Option<&'a str>,
}

#[derive(serde::Serialize)]
struct SendEmailRequest<'a> {
    from: SendEmailRequestRecipient<'a>,
    to: Vec<SendEmailRequestRecipient<'a>>,
    reply_to: Option<&'a str>,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
    project_id: ProjectId,
}

/// The mail to hand over to the relay for a recipient outside of TauMail.
pub struct OutboundEmail<'a> {
    pub recipient: &'a UserEmail,
    pub from_name: &'a str,
    pub reply_to: &'a str,
    pub subject: &'a str,
    pub html_content: &'a str,
    pub text_content: &'a str,
}

/// HTTP client of the transactional email API relaying mail to the outside world.
#[derive(Clone)]
pub struct Client {
    http_client: reqwest::Client,

    base_url: String,
    project_id: ProjectId,
    auth_key: Secret<String>,
    sender: UserEmail,
}

impl Client {
    pub fn new(
        base_url: String,
        project_id: ProjectId,
        auth_key: Secret<String>,
        sender: UserEmail,
        timeout: std::time::Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url,
            project_id,
            auth_key,
            sender,
        })
    }

    pub async fn send_email(&self, email: &OutboundEmail<'_>) -> Result<(), reqwest::Error> {
        let url = format!("{}/emails", &self.base_url);

        let body = SendEmailRequest {
            from: SendEmailRequestRecipient {
                email: self.sender.as_ref(),
                name: Some(email.from_name),
            },
            to: vec![SendEmailRequestRecipient {
                email: email.recipient.as_ref(),
                name: None,
            }],
            reply_to: Some(email.reply_to),
            project_id: self.project_id.clone(),
            subject: email.subject,
            text: email.text_content,
            html: email.html_content,
        };

        self.http_client
            .post(url)
            .header("X-Auth-Token", self.auth_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
