use super::MailMessage;

pub const RESET_SUBJECT: &str = "Your password reset code (valid for 10 min)";
pub const VERIFY_SUBJECT: &str = "Your email verification code (valid for 10 min)";

pub fn password_reset(to: &str, name: &str, company: &str, code: &str) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: RESET_SUBJECT.to_string(),
        body: format!(
            "Hi {name},\n We received a request to reset the password on your {company} Account. \n [{code}] \n Enter this code to complete the reset. \n Thanks for helping us keep your account secure.\n The {company} Team"
        ),
    }
}

pub fn email_verification(to: &str, name: &str, company: &str, code: &str) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: VERIFY_SUBJECT.to_string(),
        body: format!(
            "Hi {name},\n We received a request to verify your email on your {company} Account. \n [{code}] \n Enter this code to complete the email verification. \n Thanks for helping us keep your account secure.\n The {company} Team"
        ),
    }
}
