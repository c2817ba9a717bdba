use std::path::PathBuf;

use crate::components::brush::BrushSettings;
use crate::components::crop::{AspectRatio, CropOptions};
use crate::components::history::{DEFAULT_MAX_BYTES, DEFAULT_MAX_ENTRIES, HistoryStore};
use crate::error::EditorResult;
use crate::selection::AntsTicker;

const SETTINGS_FILE: &str = "settings.cfg";

/// Persisted editor preferences, stored as `key=value` lines.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub history_max_entries: usize,
    pub history_max_bytes: usize,
    pub brush_size: f64,
    pub brush_hardness: f64,
    pub brush_opacity: f64,
    pub brush_flow: f64,
    pub brush_spacing: f64,
    pub brush_smoothing: f64,
    pub crop_snap_enabled: bool,
    pub crop_snap_threshold: f64,
    pub crop_handle_radius: f64,
    pub ants_speed: f32,
    pub ants_dash: f32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        let brush = BrushSettings::default();
        let crop = CropOptions::default();
        Self {
            history_max_entries: DEFAULT_MAX_ENTRIES,
            history_max_bytes: DEFAULT_MAX_BYTES,
            brush_size: brush.size,
            brush_hardness: brush.hardness,
            brush_opacity: brush.opacity,
            brush_flow: brush.flow,
            brush_spacing: brush.spacing,
            brush_smoothing: brush.smoothing,
            crop_snap_enabled: crop.snap_enabled,
            crop_snap_threshold: crop.snap_threshold,
            crop_handle_radius: crop.handle_radius,
            ants_speed: 30.0,
            ants_dash: 8.0,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/paintcore/settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\PaintCore\settings.cfg
    /// On macOS:   ~/Library/Application Support/PaintCore/settings.cfg
    pub fn settings_path() -> PathBuf {
        config_dir().join(SETTINGS_FILE)
    }

    /// Load from disk; a missing or unreadable file gives the defaults.
    pub fn load() -> Self {
        match std::fs::read_to_string(Self::settings_path()) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                log::debug!("settings: using defaults ({})", e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> EditorResult<()> {
        let path = Self::settings_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.to_cfg_string())?;
        log::info!("settings: saved to {}", path.display());
        Ok(())
    }

    /// Unknown keys are ignored and malformed values keep their default.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else {
                continue;
            };
            let val = val.trim();
            match key.trim() {
                "history_max_entries" => set_parsed(&mut s.history_max_entries, val),
                "history_max_bytes" => set_parsed(&mut s.history_max_bytes, val),
                "brush_size" => set_parsed(&mut s.brush_size, val),
                "brush_hardness" => set_parsed(&mut s.brush_hardness, val),
                "brush_opacity" => set_parsed(&mut s.brush_opacity, val),
                "brush_flow" => set_parsed(&mut s.brush_flow, val),
                "brush_spacing" => set_parsed(&mut s.brush_spacing, val),
                "brush_smoothing" => set_parsed(&mut s.brush_smoothing, val),
                "crop_snap_enabled" => set_parsed(&mut s.crop_snap_enabled, val),
                "crop_snap_threshold" => set_parsed(&mut s.crop_snap_threshold, val),
                "crop_handle_radius" => set_parsed(&mut s.crop_handle_radius, val),
                "ants_speed" => set_parsed(&mut s.ants_speed, val),
                "ants_dash" => set_parsed(&mut s.ants_dash, val),
                other => log::debug!("settings: ignoring unknown key {:?}", other),
            }
        }
        s
    }

    pub fn to_cfg_string(&self) -> String {
        format!(
            "history_max_entries={}\n\
             history_max_bytes={}\n\
             brush_size={}\n\
             brush_hardness={}\n\
             brush_opacity={}\n\
             brush_flow={}\n\
             brush_spacing={}\n\
             brush_smoothing={}\n\
             crop_snap_enabled={}\n\
             crop_snap_threshold={}\n\
             crop_handle_radius={}\n\
             ants_speed={}\n\
             ants_dash={}\n",
            self.history_max_entries,
            self.history_max_bytes,
            self.brush_size,
            self.brush_hardness,
            self.brush_opacity,
            self.brush_flow,
            self.brush_spacing,
            self.brush_smoothing,
            self.crop_snap_enabled,
            self.crop_snap_threshold,
            self.crop_handle_radius,
            self.ants_speed,
            self.ants_dash,
        )
    }

    pub fn brush_settings(&self) -> BrushSettings {
        BrushSettings {
            size: self.brush_size,
            hardness: self.brush_hardness,
            opacity: self.brush_opacity,
            flow: self.brush_flow,
            spacing: self.brush_spacing,
            smoothing: self.brush_smoothing,
        }
    }

    pub fn crop_options(&self) -> CropOptions {
        CropOptions {
            aspect: AspectRatio::Free,
            snap_enabled: self.crop_snap_enabled,
            snap_threshold: self.crop_snap_threshold,
            handle_radius: self.crop_handle_radius,
        }
    }

    pub fn history_store(&self) -> HistoryStore {
        HistoryStore::new(self.history_max_entries, self.history_max_bytes)
    }

    pub fn ants_ticker(&self) -> AntsTicker {
        AntsTicker::new(self.ants_speed, self.ants_dash)
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, val: &str) {
    match val.parse() {
        Ok(v) => *slot = v,
        Err(_) => log::warn!("settings: malformed value {:?}, keeping default", val),
    }
}

fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("PaintCore");
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("PaintCore");
        }
    }
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|_| PathBuf::from("."));
    base.join("paintcore")
}
