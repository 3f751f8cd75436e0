//! Email composition.

use serde::Serialize;

use crate::domain::WatchRequest;
use crate::error::SlotwatchError;

/// A composed HTML email
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

fn doctor_line(request: &WatchRequest) -> String {
    match &request.doctor {
        Some(doctor) => format!("<p>Appointments with {}</p>", doctor.full_name()),
        None => String::new(),
    }
}

/// "New slots are available" email for the requester
pub fn availability(request: &WatchRequest, from: &str) -> EmailMessage {
    EmailMessage {
        from: from.to_string(),
        to: request.notification_email.clone(),
        subject: format!("New {} appointments available!", request.service),
        html: format!(
            "<b>New {} appointments have appeared on the portal!</b>{}",
            request.service,
            doctor_line(request)
        ),
    }
}

/// "We booked it for you" email for the requester
pub fn booked_on_behalf(request: &WatchRequest, from: &str) -> EmailMessage {
    EmailMessage {
        from: from.to_string(),
        to: request.notification_email.clone(),
        subject: format!("{} appointment booked for you", request.service),
        html: format!(
            "<b>An appointment for {} was booked on your behalf.</b>{}\
             <p>Check the portal for the date and location, and cancel it there if it does not suit you.</p>",
            request.service,
            doctor_line(request)
        ),
    }
}

/// Operator-facing failure report. Never includes credentials.
pub fn error_report(request: &WatchRequest, error: &SlotwatchError, from: &str, to: &str) -> EmailMessage {
    EmailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: format!("slotwatch: error while watching {}", request.service),
        html: format!(
            "<p>Request <code>{}</code> (service {}, login {})</p><pre>{}</pre>",
            request.id,
            request.service,
            request.login(),
            error
        ),
    }
}
