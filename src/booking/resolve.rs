//! Turning a submitted request into a watchable one

use crate::domain::{NewRequest, WatchRequest};
use crate::error::{Result, SlotwatchError};
use crate::portal::PortalSession;

/// Validate the service and resolve the optional doctor name to a portal id.
///
/// Unknown services and unknown doctors are rejected up front so the
/// watcher never polls for something the portal cannot offer.
pub async fn resolve_request(session: &dyn PortalSession, new: NewRequest) -> Result<WatchRequest> {
    let variant = session
        .find_variant(&new.service)
        .await?
        .ok_or_else(|| SlotwatchError::VariantNotFound(new.service.clone()))?;

    let doctor = match &new.doctor {
        Some(name) => Some(
            session
                .find_doctor(variant.id, &name.first_name, &name.last_name)
                .await?
                .ok_or_else(|| SlotwatchError::DoctorNotFound {
                    first_name: name.first_name.clone(),
                    last_name: name.last_name.clone(),
                })?,
        ),
        None => None,
    };

    let mut request = WatchRequest::new(new.credentials, new.service, new.notification_email)
        .with_auto_book(new.auto_book);
    if let Some(doctor) = doctor {
        request = request.with_doctor(doctor);
    }
    log::debug!("Resolved request {} for service {}", request.id, request.service);
    Ok(request)
}
