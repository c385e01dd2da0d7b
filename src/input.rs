//! Multitouch input device discovery (evdev 0.13.2 compatible).

use evdev::{AbsoluteAxisCode, Device, EventType};

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    /// (min, max) of ABS_MT_POSITION_X / _Y, when the driver reports them.
    pub x_range: Option<(i32, i32)>,
    pub y_range: Option<(i32, i32)>,
}

fn is_multitouch(dev: &Device) -> bool {
    if !dev.supported_events().contains(EventType::ABSOLUTE) {
        return false;
    }
    dev.supported_absolute_axes().map_or(false, |a| {
        a.contains(AbsoluteAxisCode::ABS_MT_SLOT)
            && a.contains(AbsoluteAxisCode::ABS_MT_POSITION_X)
            && a.contains(AbsoluteAxisCode::ABS_MT_POSITION_Y)
    })
}

fn axis_range(dev: &Device, axis: AbsoluteAxisCode) -> Option<(i32, i32)> {
    let info = dev.get_absinfo().ok()?;
    info.into_iter()
        .find(|(code, _)| *code == axis)
        .map(|(_, abs)| (abs.minimum(), abs.maximum()))
}

/// Scan /dev/input for devices speaking the MT slot protocol.
pub fn discover_multitouch() -> Vec<DeviceInfo> {
    let mut out = vec![];
    if let Ok(rd) = std::fs::read_dir("/dev/input") {
        for e in rd.flatten() {
            let p = e.path();
            let is_event_node = p
                .file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.starts_with("event"))
                .unwrap_or(false);
            if !is_event_node {
                continue;
            }
            if let Ok(dev) = Device::open(&p) {
                if is_multitouch(&dev) {
                    out.push(DeviceInfo {
                        path: p.display().to_string(),
                        name: dev.name().unwrap_or("unknown").to_string(),
                        x_range: axis_range(&dev, AbsoluteAxisCode::ABS_MT_POSITION_X),
                        y_range: axis_range(&dev, AbsoluteAxisCode::ABS_MT_POSITION_Y),
                    });
                }
            }
        }
    }
    out
}
