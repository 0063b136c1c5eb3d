use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::error::RegistrationError;
use super::inventory::DriveInventory;
use super::models::{IngestionProfile, RegisterRequest};
use super::registry::Registry;

/// Register a connected device for ingestion.
///
/// The device must be present in a fresh inventory; its characteristics at
/// this moment are stored with the profile.
pub async fn register_profile(
    registry: &dyn Registry,
    inventory: &DriveInventory,
    request: RegisterRequest,
) -> Result<IngestionProfile, RegistrationError> {
    let Some(drive) = inventory.drive_by_serial(&request.serial).await else {
        return Err(RegistrationError::DeviceNotConnected(request.serial));
    };

    if registry.profile_exists(&request.serial).await? {
        return Err(RegistrationError::AlreadyRegistered(request.serial));
    }

    let now = Utc::now();
    let profile = IngestionProfile {
        id: Uuid::now_v7().to_string(),
        serial: request.serial,
        copy_to: request.copy_to,
        allowed_extensions: request.allowed_extensions,
        copy_on_attach: request.copy_on_attach,
        device_details: drive,
        created_at: now,
        updated_at: now,
    };

    registry.register(profile.clone()).await?;
    info!(serial = %profile.serial, id = %profile.id, "Registered ingestion device");

    Ok(profile)
}
