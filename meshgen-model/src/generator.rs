//! Six views in, textured mesh file out.

use crate::camera::{InputCameras, NUM_VIEWS};
use crate::checkpoint::{
    CheckpointFetcher, CheckpointStore, CheckpointTensors, HubFetcher, read_state_dict,
    strip_prefix,
};
use crate::config::{DevicePreference, GeneratorConfig};
use crate::error::{MeshGenError, Result};
use crate::network::{ExtractOptions, LrmMesh};
use candle_core::{DType, Device, Tensor};
use image::RgbImage;
use meshgen_data::MeshOutput;
use std::path::Path;
use tracing::{debug, info, warn};

/// Side length every input view must have.
pub const IMAGE_SIZE: u32 = 320;

/// Anything that turns posed views into planes and planes into a mesh.
pub trait ReconstructionModel {
    fn forward_planes(&self, images: &Tensor, cameras: &Tensor) -> Result<Tensor>;

    fn extract_mesh(&self, planes: &Tensor, options: &ExtractOptions) -> Result<MeshOutput>;
}

impl ReconstructionModel for LrmMesh {
    fn forward_planes(&self, images: &Tensor, cameras: &Tensor) -> Result<Tensor> {
        LrmMesh::forward_planes(self, images, cameras)
    }

    fn extract_mesh(&self, planes: &Tensor, options: &ExtractOptions) -> Result<MeshOutput> {
        LrmMesh::extract_mesh(self, planes, options)
    }
}

/// Writes a finished mesh somewhere.
pub trait MeshExporter {
    fn export(&self, mesh: &MeshOutput, path: &Path) -> Result<()>;
}

/// OBJ with MTL and PNG for textured meshes, colored OBJ otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjExporter;

impl MeshExporter for ObjExporter {
    fn export(&self, mesh: &MeshOutput, path: &Path) -> Result<()> {
        meshgen_data::write_mesh(mesh, path)?;
        Ok(())
    }
}

/// Pick the compute device for a preference.
pub fn select_device(preference: DevicePreference) -> Result<Device> {
    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Auto => Device::cuda_if_available(0)?,
        DevicePreference::Cuda => Device::new_cuda(0)?,
    };
    Ok(device)
}

/// Seed the device RNG. The CPU backend has no seedable generator; that is
/// fine because inference draws no random numbers.
fn seed_device(device: &Device, seed: u64) {
    if let Err(e) = device.set_seed(seed) {
        debug!("Device RNG not seeded: {}", e);
    }
}

pub struct MeshGenerator {
    model: Box<dyn ReconstructionModel>,
    exporter: Box<dyn MeshExporter>,
    cameras: Tensor,
    device: Device,
    export_texture_map: bool,
}

impl MeshGenerator {
    /// Build a generator, downloading the checkpoint from the hub if it is
    /// not cached yet.
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let fetcher = HubFetcher::new(&config.checkpoint.endpoint)?;
        Self::with_fetcher(config, &fetcher)
    }

    /// Build a generator, using `fetcher` on a checkpoint cache miss.
    #[tracing::instrument(skip_all)]
    pub fn with_fetcher(config: &GeneratorConfig, fetcher: &dyn CheckpointFetcher) -> Result<Self> {
        config.model.validate()?;

        let device = select_device(config.device)?;
        seed_device(&device, config.seed);
        info!("Using device {:?}", device);

        let path = CheckpointStore::new(&config.checkpoint).ensure_local(fetcher)?;
        let tensors = read_state_dict(&path, &config.checkpoint.state_dict_key)?;
        let tensors = strip_prefix(tensors, &config.checkpoint.prefix)?;

        let tensors = CheckpointTensors::new(tensors);
        let mut model = LrmMesh::new(&config.model, tensors.var_builder(DType::F32, &device))?;
        tensors.finish()?;
        info!("Loaded reconstruction model from {}", path.display());

        model.init_geometry(config.geometry_fovy);

        let cameras = InputCameras::six_views(config.camera_radius, config.camera_fov)
            .to_tensor(1, &device)?;

        Ok(Self {
            model: Box::new(model),
            exporter: Box::new(ObjExporter),
            cameras,
            device,
            export_texture_map: config.export_texture_map,
        })
    }

    /// Assemble a generator from its collaborators.
    ///
    /// `cameras` is the `[1, 6, 16]` camera tensor; its device is the one the
    /// input images are uploaded to.
    pub fn from_parts(
        model: Box<dyn ReconstructionModel>,
        exporter: Box<dyn MeshExporter>,
        cameras: Tensor,
        export_texture_map: bool,
    ) -> Self {
        let device = cameras.device().clone();
        Self {
            model,
            exporter,
            cameras,
            device,
            export_texture_map,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Reconstruct a mesh from the six views and write it to `output_path`.
    ///
    /// Views must come in the fixed camera order, each `IMAGE_SIZE` square.
    /// With texture export on, the MTL and PNG land next to the OBJ.
    #[tracing::instrument(skip(self, images), fields(path = %output_path.display()))]
    pub fn generate(
        &self,
        images: &[RgbImage],
        texture_size: u32,
        output_path: &Path,
    ) -> Result<()> {
        validate_views(images)?;
        if texture_size == 0 {
            return Err(MeshGenError::InvalidTextureSize);
        }

        let batch = views_to_tensor(images, &self.device)?;
        info!("Reconstructing triplane from {} views", images.len());
        let planes = self.model.forward_planes(&batch, &self.cameras)?;
        debug!("Planes {:?}", planes.dims());

        let options = ExtractOptions {
            use_texture_map: self.export_texture_map,
            texture_resolution: texture_size,
        };
        let mesh = self.model.extract_mesh(&planes, &options)?;
        if mesh.signed_volume() < 0.0 {
            warn!("Extracted mesh has negative volume; it may be inside out");
        }

        self.exporter.export(&mesh, output_path)?;
        info!(
            "Wrote mesh with {} vertices and {} faces to {}",
            mesh.vertices().len(),
            mesh.faces().len(),
            output_path.display()
        );
        Ok(())
    }
}

fn validate_views(images: &[RgbImage]) -> Result<()> {
    if images.len() != NUM_VIEWS {
        return Err(MeshGenError::InvalidViewCount {
            expected: NUM_VIEWS,
            found: images.len(),
        });
    }
    for (index, image) in images.iter().enumerate() {
        let (width, height) = image.dimensions();
        if width != IMAGE_SIZE || height != IMAGE_SIZE {
            return Err(MeshGenError::InvalidImageSize {
                index,
                width,
                height,
                expected: IMAGE_SIZE,
            });
        }
    }
    Ok(())
}

/// `[1, views, 3, h, w]` in `[0, 1]`, channel-first.
fn views_to_tensor(images: &[RgbImage], device: &Device) -> Result<Tensor> {
    let (width, height) = images.first().map(|i| i.dimensions()).unwrap_or((0, 0));
    let plane = (width * height) as usize;
    let mut data = vec![0f32; images.len() * 3 * plane];
    for (view, image) in images.iter().enumerate() {
        let base = view * 3 * plane;
        for (i, pixel) in image.pixels().enumerate() {
            for c in 0..3 {
                data[base + c * plane + i] = pixel[c] as f32 / 255.0;
            }
        }
    }
    let batch = Tensor::from_vec(
        data,
        (1, images.len(), 3, height as usize, width as usize),
        device,
    )?;
    Ok(batch.clamp(0f32, 1f32)?)
}
