//! Builds the notification email sent to the site owner.

use crate::config::SiteConfig;
use crate::submission::ContactSubmission;
use chrono::Datelike;
use serde::Serialize;

/// A fully rendered message, ready for the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub reply_to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub struct EmailComposer {
    owner_name: String,
    subject_prefix: String,
}

impl EmailComposer {
    pub fn new(site: &SiteConfig) -> Self {
        Self {
            owner_name: site.owner_name.clone(),
            subject_prefix: site.subject_prefix.clone(),
        }
    }

    /// Renders `submission` as a message from and to `account`, replying to
    /// the submitter.
    pub fn compose(&self, submission: &ContactSubmission, account: &str) -> OutgoingEmail {
        OutgoingEmail {
            from: format!("\"{}\" <{}>", display_name(&submission.name), account),
            to: account.to_string(),
            reply_to: submission.email.clone(),
            subject: format!(
                "{}: {}",
                self.subject_prefix,
                submission.name.replace(['\r', '\n'], " ")
            ),
            text: self.text_body(submission),
            html: self.html_body(submission, chrono::Utc::now().year()),
        }
    }

    fn text_body(&self, submission: &ContactSubmission) -> String {
        format!(
            "Name: {}\nEmail: {}\n\nMessage:\n{}\n",
            submission.name, submission.email, submission.message
        )
    }

    /// `mailto:` link that opens a reply with subject and greeting filled in.
    pub fn reply_link(&self, submission: &ContactSubmission) -> String {
        let subject = format!("Message from {}", self.owner_name);
        let body = format!(
            "Hello {},\n\nThank you for getting in touch.\n",
            submission.name
        );
        // `@` may stay literal in a mailto address; everything else that is
        // not unreserved is escaped so the address cannot add header fields.
        let address = urlencoding::encode(&submission.email).replace("%40", "@");
        format!(
            "mailto:{}?subject={}&body={}",
            address,
            urlencoding::encode(&subject),
            urlencoding::encode(&body)
        )
    }

    fn html_body(&self, submission: &ContactSubmission, year: i32) -> String {
        let name = escape_html(&submission.name);
        let email = escape_html(&submission.email);
        let message = escape_html(&submission.message);
        let reply = escape_html(&self.reply_link(submission));
        let owner = escape_html(&self.owner_name);

        format!(
            r##"<!DOCTYPE html>
<html>
<head>
  <style>
    body {{ font-family: 'Inter', sans-serif; background-color: #D6EBF3; margin: 0; padding: 0; }}
    .container {{ max-width: 600px; margin: 40px auto; background-color: #ffffff; border-radius: 12px; overflow: hidden; }}
    .header {{ background: linear-gradient(to right, #447F98, #629BB5); padding: 30px; text-align: center; color: white; }}
    .header h1 {{ margin: 0; font-size: 24px; font-weight: 700; }}
    .content {{ padding: 30px; color: #1f2937; }}
    .field {{ margin-bottom: 20px; }}
    .label {{ font-size: 12px; text-transform: uppercase; color: #6b7280; font-weight: 600; margin-bottom: 4px; }}
    .value {{ font-size: 16px; line-height: 1.5; color: #111827; }}
    .message-box {{ background-color: #f9fafb; border: 1px solid #B9D8E1; border-radius: 8px; padding: 16px; margin-top: 8px; white-space: pre-wrap; }}
    .footer {{ background-color: #f9fafb; padding: 20px; text-align: center; font-size: 12px; color: #9ca3af; border-top: 1px solid #B9D8E1; }}
  </style>
</head>
<body>
  <div class="container">
    <div class="header">
      <h1>{prefix}</h1>
    </div>
    <div class="content">
      <div class="field">
        <div class="label">From</div>
        <div class="value"><strong>{name}</strong></div>
      </div>
      <div class="field">
        <div class="label">Email</div>
        <div class="value"><a href="mailto:{email}" style="color: #447F98; text-decoration: none;">{email}</a></div>
      </div>
      <div class="field">
        <div class="label">Message</div>
        <div class="value message-box">{message}</div>
      </div>
      <div style="text-align: center;">
        <a href="{reply}" style="display: inline-block; background-color: #447F98; color: #ffffff; padding: 14px 28px; text-decoration: none; border-radius: 6px; font-weight: bold; margin-top: 20px; border: 1px solid #629BB5;">
          <span style="color: #ffffff !important; font-family: sans-serif;">Reply via email</span>
        </a>
      </div>
    </div>
    <div class="footer">
      <p>This email was sent from your portfolio contact form.</p>
      <p>&copy; {year} {owner}</p>
    </div>
  </div>
</body>
</html>
"##,
            prefix = escape_html(&self.subject_prefix),
        )
    }
}

/// Quotes and angle brackets would break out of the `"name" <addr>` header.
fn display_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '"' | '<' | '>' | '\r' | '\n'))
        .collect()
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
