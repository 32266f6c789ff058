//! Camera device registry with per-user leases

use crate::config::CameraConfig;
use crate::error::DetectionError;
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the capture stage gets its frames. `None` is a transient miss.
pub trait FrameSource: Send + Sync {
    fn acquire(&self) -> Option<Mat>;
}

struct Device {
    capture: Arc<Mutex<VideoCapture>>,
    users: HashSet<String>,
}

/// Owns every open camera device.
///
/// Created once at startup and shared by `Arc`. A device is opened by its
/// first user and closed when its last user releases it. Reads on one device
/// are serialized by that device's own lock.
#[derive(Default)]
pub struct CameraRegistry {
    devices: Mutex<HashMap<u32, Device>>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user_id` on `camera_id`, opening the device if needed
    pub fn open(
        self: &Arc<Self>,
        camera_id: u32,
        user_id: impl Into<String>,
        config: &CameraConfig,
    ) -> Result<CameraLease, DetectionError> {
        let user_id = user_id.into();
        let mut devices = self.devices.lock();

        if let Some(device) = devices.get_mut(&camera_id) {
            device.users.insert(user_id.clone());
            debug!("Camera {} shared with {} ({} users)", camera_id, user_id, device.users.len());
        } else {
            let capture = open_device(camera_id, config)?;
            let mut users = HashSet::new();
            users.insert(user_id.clone());
            devices.insert(
                camera_id,
                Device {
                    capture: Arc::new(Mutex::new(capture)),
                    users,
                },
            );
            info!(
                "Camera {} opened at {}x{} @ {}fps for {}",
                camera_id, config.resolution.0, config.resolution.1, config.frame_rate, user_id
            );
        }

        Ok(CameraLease {
            registry: Arc::clone(self),
            camera_id,
            user_id,
        })
    }

    /// Read one frame; failed or empty reads give `None`
    pub fn capture(&self, camera_id: u32) -> Option<Mat> {
        let handle = {
            let devices = self.devices.lock();
            Arc::clone(&devices.get(&camera_id)?.capture)
        };

        let mut frame = Mat::default();
        let mut capture = handle.lock();
        match capture.read(&mut frame) {
            Ok(true) if !frame.empty() => Some(frame),
            Ok(_) => {
                debug!("Camera {} returned no frame", camera_id);
                None
            }
            Err(e) => {
                warn!("Camera {} read error: {}", camera_id, e);
                None
            }
        }
    }

    /// Drop `user_id` from `camera_id`; the device closes with its last user
    pub fn release(&self, camera_id: u32, user_id: &str) {
        let mut devices = self.devices.lock();
        let Some(device) = devices.get_mut(&camera_id) else {
            return;
        };
        device.users.remove(user_id);
        if device.users.is_empty() {
            if let Some(device) = devices.remove(&camera_id) {
                close_device(camera_id, &device);
            }
        }
    }

    pub fn release_all(&self) {
        let mut devices = self.devices.lock();
        for (camera_id, device) in devices.drain() {
            close_device(camera_id, &device);
        }
    }

    pub fn is_active(&self, camera_id: u32) -> bool {
        self.devices.lock().contains_key(&camera_id)
    }

    /// Current users of `camera_id`, sorted
    pub fn users(&self, camera_id: u32) -> Vec<String> {
        let devices = self.devices.lock();
        let mut users: Vec<String> = devices
            .get(&camera_id)
            .map(|d| d.users.iter().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    #[cfg(test)]
    fn insert_unopened(&self, camera_id: u32, user_id: &str) {
        let capture = VideoCapture::default().unwrap();
        let mut devices = self.devices.lock();
        let device = devices.entry(camera_id).or_insert_with(|| Device {
            capture: Arc::new(Mutex::new(capture)),
            users: HashSet::new(),
        });
        device.users.insert(user_id.to_string());
    }
}

fn open_device(camera_id: u32, config: &CameraConfig) -> Result<VideoCapture, DetectionError> {
    let mut capture = VideoCapture::new(camera_id as i32, CAP_ANY)
        .map_err(|e| DetectionError::Camera(format!("Failed to open camera {}: {}", camera_id, e)))?;

    if !capture
        .is_opened()
        .map_err(|e| DetectionError::Camera(format!("Camera {} not opened: {}", camera_id, e)))?
    {
        return Err(DetectionError::Camera(format!("Camera {} failed to open", camera_id)));
    }

    capture
        .set(CAP_PROP_FRAME_WIDTH, config.resolution.0 as f64)
        .map_err(|e| DetectionError::Camera(format!("Failed to set width: {}", e)))?;
    capture
        .set(CAP_PROP_FRAME_HEIGHT, config.resolution.1 as f64)
        .map_err(|e| DetectionError::Camera(format!("Failed to set height: {}", e)))?;
    capture
        .set(CAP_PROP_FPS, config.frame_rate as f64)
        .map_err(|e| DetectionError::Camera(format!("Failed to set FPS: {}", e)))?;

    let mut probe = Mat::default();
    let ok = capture
        .read(&mut probe)
        .map_err(|e| DetectionError::Camera(format!("Camera {} test read failed: {}", camera_id, e)))?;
    if !ok || probe.empty() {
        return Err(DetectionError::Camera(format!("Camera {} produced no test frame", camera_id)));
    }

    Ok(capture)
}

fn close_device(camera_id: u32, device: &Device) {
    if let Err(e) = device.capture.lock().release() {
        warn!("Camera {} release failed: {}", camera_id, e);
    }
    info!("Camera {} released", camera_id);
}

/// One user's hold on a camera. Releases on drop.
pub struct CameraLease {
    registry: Arc<CameraRegistry>,
    camera_id: u32,
    user_id: String,
}

impl CameraLease {
    pub fn camera_id(&self) -> u32 {
        self.camera_id
    }
}

impl FrameSource for CameraLease {
    fn acquire(&self) -> Option<Mat> {
        self.registry.capture(self.camera_id)
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.registry.release(self.camera_id, &self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_user_closes_device() {
        let registry = CameraRegistry::new();
        registry.insert_unopened(3, "viewer");
        registry.insert_unopened(3, "detector");
        assert_eq!(registry.users(3), vec!["detector".to_string(), "viewer".to_string()]);

        registry.release(3, "viewer");
        assert!(registry.is_active(3));
        registry.release(3, "detector");
        assert!(!registry.is_active(3));
    }

    #[test]
    fn test_unopened_device_yields_no_frame() {
        let registry = CameraRegistry::new();
        registry.insert_unopened(1, "detector");
        assert!(registry.capture(1).is_none());
        assert!(registry.capture(2).is_none());
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let registry = Arc::new(CameraRegistry::new());
        registry.insert_unopened(5, "detector");
        let lease = CameraLease {
            registry: Arc::clone(&registry),
            camera_id: 5,
            user_id: "detector".to_string(),
        };
        assert_eq!(lease.camera_id(), 5);
        assert!(lease.acquire().is_none());
        drop(lease);
        assert!(!registry.is_active(5));
    }

    #[test]
    fn test_release_all() {
        let registry = CameraRegistry::new();
        registry.insert_unopened(0, "a");
        registry.insert_unopened(1, "b");
        registry.release_all();
        assert!(!registry.is_active(0));
        assert!(!registry.is_active(1));
        assert!(registry.users(0).is_empty());
    }
}
