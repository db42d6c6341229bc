use super::types::CameraDescriptor;
use crate::error_handling::types::RegistryError;

/// Lookup interface of the external camera registry.
pub trait CameraRegistry: Send + Sync {
    /// Lists the cameras registered by `user_id`, in index order.
    fn list_cameras(&self, user_id: &str) -> Result<Vec<CameraDescriptor>, RegistryError>;

    /// Returns the camera at `index` or [`RegistryError::NotFound`].
    fn get_camera(&self, user_id: &str, index: usize) -> Result<CameraDescriptor, RegistryError> {
        self.list_cameras(user_id)?
            .into_iter()
            .nth(index)
            .ok_or(RegistryError::NotFound)
    }
}
