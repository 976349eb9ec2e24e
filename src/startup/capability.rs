use bevy::{prelude::*, render::renderer::RenderAdapterInfo, window::PrimaryWindow};
use enum_map::{enum_map, Enum, EnumMap};
use serde::Deserialize;
use wgpu::DeviceType;

use crate::{
    data::config::{QualityConfig, RippleConfig},
    systems::ripple::simulation::FieldStrategy,
};

#[derive(Enum, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Configured strategy at full rate.
    #[default]
    Full,
    /// Cheaper splat field.
    Reduced,
    /// Undistorted scene, no simulation.
    Static,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterKind {
    Hardware,
    Software,
}

impl AdapterKind {
    pub fn from_device_type(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Cpu => Self::Software,
            DeviceType::IntegratedGpu
            | DeviceType::DiscreteGpu
            | DeviceType::VirtualGpu
            | DeviceType::Other => Self::Hardware,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Capabilities {
    pub gpu: Option<AdapterKind>,
    /// Unclamped display scale factor.
    pub pixel_ratio: f32,
    pub cores: usize,
}

impl Capabilities {
    pub fn detect(adapter: Option<&RenderAdapterInfo>, pixel_ratio: f32) -> Self {
        let gpu = adapter.map(|info| {
            let kind = AdapterKind::from_device_type(info.device_type);
            debug!("render adapter {} ({:?})", info.name, kind);
            kind
        });
        let cores = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);

        Self {
            gpu,
            pixel_ratio,
            cores,
        }
    }
}

pub fn select_quality(capabilities: &Capabilities, config: &QualityConfig) -> Quality {
    if let Some(forced) = config.force {
        return forced;
    }
    match capabilities.gpu {
        None => Quality::Static,
        Some(AdapterKind::Software) => Quality::Reduced,
        Some(AdapterKind::Hardware)
            if capabilities.cores < config.reduced_below_cores
                || capabilities.pixel_ratio >= 3.0 =>
        {
            Quality::Reduced
        }
        Some(AdapterKind::Hardware) => Quality::Full,
    }
}

/// Field strategy to run at `quality`; `None` means no simulation.
pub fn strategy_for(quality: Quality, configured: FieldStrategy) -> Option<FieldStrategy> {
    let plan: EnumMap<Quality, Option<FieldStrategy>> = enum_map! {
        Quality::Full => Some(configured),
        Quality::Reduced => Some(FieldStrategy::Splat),
        Quality::Static => None,
    };
    plan[quality]
}

#[derive(Resource, Clone, Copy, Debug)]
pub struct RenderQuality {
    pub quality: Quality,
    pub capabilities: Capabilities,
}

impl RenderQuality {
    pub fn strategy(&self, config: &RippleConfig) -> Option<FieldStrategy> {
        strategy_for(self.quality, config.simulation.strategy)
    }
}

pub fn detect_quality(
    mut commands: Commands,
    config: Res<RippleConfig>,
    adapter: Option<Res<RenderAdapterInfo>>,
    windows: Query<&Window, With<PrimaryWindow>>,
) {
    let pixel_ratio = windows
        .single()
        .map(|window| window.scale_factor())
        .unwrap_or(1.0);
    let capabilities = Capabilities::detect(adapter.as_deref(), pixel_ratio);
    let quality = select_quality(&capabilities, &config.quality);
    info!(
        "ripple quality {:?} (gpu {:?}, {} cores, pixel ratio {})",
        quality, capabilities.gpu, capabilities.cores, capabilities.pixel_ratio
    );

    commands.insert_resource(RenderQuality {
        quality,
        capabilities,
    });
}
