use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererSettings {
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub hdr_enabled: bool,
    #[serde(default = "RendererSettings::default_shader_root")]
    pub shader_root: PathBuf,
    #[serde(default = "RendererSettings::default_texture_root")]
    pub texture_root: PathBuf,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            window: WindowSettings::default(),
            hdr_enabled: false,
            shader_root: Self::default_shader_root(),
            texture_root: Self::default_texture_root(),
        }
    }
}

impl RendererSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RendererSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded renderer settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default renderer settings.",
                        path, err
                    );
                    RendererSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Renderer settings file {:?} not found. Using default settings.",
                    path
                );
                RendererSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default renderer settings.",
                    path, err
                );
                RendererSettings::default()
            }
        }
    }

    fn validate(mut self) -> Self {
        if self.window.width == 0 || self.window.height == 0 {
            warn!("Window size must be greater than zero. Using default size.");
            self.window.width = WindowSettings::default().width;
            self.window.height = WindowSettings::default().height;
        }

        if self.shader_root.as_os_str().is_empty() {
            warn!("Shader root is empty. Using {:?}.", Self::default_shader_root());
            self.shader_root = Self::default_shader_root();
        }

        if self.texture_root.as_os_str().is_empty() {
            warn!("Texture root is empty. Using {:?}.", Self::default_texture_root());
            self.texture_root = Self::default_texture_root();
        }

        self
    }

    fn default_shader_root() -> PathBuf {
        PathBuf::from("data/shaders")
    }

    fn default_texture_root() -> PathBuf {
        PathBuf::from("data/textures")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    #[serde(default = "WindowSettings::default_vsync")]
    pub vsync: bool,
    #[serde(default)]
    pub fullscreen: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            vsync: Self::default_vsync(),
            fullscreen: false,
        }
    }
}

impl WindowSettings {
    const fn default_vsync() -> bool {
        true
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// FIFO with vsync, otherwise the first tear-free or immediate mode on offer.
    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired: &[wgpu::PresentMode] = if self.vsync {
            &[wgpu::PresentMode::Fifo]
        } else {
            &[wgpu::PresentMode::Mailbox, wgpu::PresentMode::Immediate]
        };
        if let Some(mode) = desired.iter().copied().find(|m| available.contains(m)) {
            return mode;
        }

        warn!(
            "Requested present modes {:?} are not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }
}
