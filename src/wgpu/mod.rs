//! wgpu execution backend
//!
//! Thin adapter from [`ProgramPlan`] to wgpu: one bind group layout per
//! cached pipeline, uniforms staged per dispatch, buffers bound whole.

use std::collections::HashMap;
use std::sync::Mutex;

use wgpu::util::DeviceExt;

use crate::adapter::AdapterProfile;
use crate::compute::ComputeBackend;
use crate::error::{Error, Result};
use crate::program::ProgramPlan;
use crate::tensor::TensorDesc;

/// PCI vendor id to the lowercase vendor string WebGPU reports.
fn vendor_name(vendor_id: u32) -> Option<&'static str> {
    match vendor_id {
        0x1002 => Some("amd"),
        0x106B => Some("apple"),
        0x13B5 => Some("arm"),
        0x8086 => Some("intel"),
        0x10DE => Some("nvidia"),
        0x5143 => Some("qualcomm"),
        _ => None,
    }
}

impl AdapterProfile {
    /// Derive a profile from a native adapter.
    ///
    /// Native wgpu reports only the PCI vendor id; the architecture string
    /// exists in the browser API alone, so it starts empty here. Callers
    /// that know the hardware can fill it in with
    /// [`with_architecture`](AdapterProfile::with_architecture).
    pub fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        match vendor_name(info.vendor) {
            Some(name) => Self::vendor_only(name),
            None => Self::vendor_only(format!("0x{:04x}", info.vendor)),
        }
    }
}

struct CachedPipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    profile: AdapterProfile,
    pipelines: Mutex<HashMap<String, CachedPipeline>>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, profile: AdapterProfile) -> Self {
        Self {
            device,
            queue,
            profile,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Upload raw bytes into a new storage buffer.
    pub fn upload(&self, label: &str, data: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            })
    }

    fn checkout_pipeline(&self, plan: &ProgramPlan) -> Result<()> {
        let mut cache = self
            .pipelines
            .lock()
            .map_err(|_| Error::Backend {
                reason: "pipeline cache poisoned".into(),
            })?;
        if cache.contains_key(&plan.cache_key) {
            return Ok(());
        }

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&plan.label),
                source: wgpu::ShaderSource::Wgsl(plan.source.as_str().into()),
            });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = plan
            .bindings
            .iter()
            .enumerate()
            .map(|(i, binding)| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: if i + 1 == plan.bindings.len() {
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    }
                } else {
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage {
                            read_only: binding.read_only,
                        },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    }
                },
                count: None,
            })
            .collect();
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&plan.label),
                entries: &entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&plan.label),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&plan.label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(plan.entry_point),
                compilation_options: Default::default(),
                cache: None,
            });

        cache.insert(plan.cache_key.clone(), CachedPipeline { pipeline, layout });
        Ok(())
    }
}

impl ComputeBackend for WgpuBackend {
    type Buffer = wgpu::Buffer;

    fn adapter(&self) -> &AdapterProfile {
        &self.profile
    }

    fn output(&mut self, desc: &TensorDesc) -> Result<wgpu::Buffer> {
        // zero-sized tensors still need a bindable buffer
        let size = desc.size_in_bytes().max(4) as u64;
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("matmul_nbits_output"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        }))
    }

    fn submit(&mut self, plan: &ProgramPlan, buffers: &[&wgpu::Buffer]) -> Result<()> {
        if plan.source.starts_with("enable f16;")
            && !self.device.features().contains(wgpu::Features::SHADER_F16)
        {
            return Err(Error::Backend {
                reason: "device does not support shader f16".into(),
            });
        }

        self.checkout_pipeline(plan)?;
        let cache = self
            .pipelines
            .lock()
            .map_err(|_| Error::Backend {
                reason: "pipeline cache poisoned".into(),
            })?;
        let cached = cache.get(&plan.cache_key).ok_or_else(|| Error::Backend {
            reason: "pipeline evicted between checkout and submit".into(),
        })?;

        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&plan.label),
                contents: &plan.uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: buffers.len() as u32,
            resource: uniform_buffer.as_entire_binding(),
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&plan.label),
            layout: &cached.layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&plan.label),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&plan.label),
                timestamp_writes: None,
            });
            pass.set_pipeline(&cached.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let [x, y, z] = plan.dispatch;
            pass.dispatch_workgroups(x, y, z);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_mapping() {
        assert_eq!(vendor_name(0x8086), Some("intel"));
        assert_eq!(vendor_name(0x10DE), Some("nvidia"));
        assert_eq!(vendor_name(0x1002), Some("amd"));
        assert_eq!(vendor_name(0xFFFF), None);
    }
}
