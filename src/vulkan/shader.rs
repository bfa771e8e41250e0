//! Shader-module creation from SPIR-V bytecode.

use std::ffi::CString;

use anyhow::{anyhow, Result};
use vulkanalia::bytecode::Bytecode;
use vulkanalia::prelude::v1_0::*;

use crate::types::{ShaderDesc, ShaderStage};

/// Backend record behind a `ShaderHandle`. The entry-point name is owned
/// here so pipeline creation can borrow it for as long as the shader lives.
pub(crate) struct Shader {
    pub module: vk::ShaderModule,
    pub stage: ShaderStage,
    pub entry_point: CString,
}

pub(crate) unsafe fn create_shader(device: &Device, desc: &ShaderDesc) -> Result<Shader> {
    if desc.code.is_empty() {
        return Err(anyhow!("shader bytecode must not be empty"));
    }

    let entry_point = if desc.entry_point.is_empty() {
        "main"
    } else {
        desc.entry_point
    };
    let entry_point = CString::new(entry_point)?;

    let bytecode = Bytecode::new(desc.code)
        .map_err(|_| anyhow!("shader bytecode is not valid SPIR-V (bad size or alignment)"))?;
    let info = vk::ShaderModuleCreateInfo::builder()
        .code_size(bytecode.code_size())
        .code(bytecode.code());

    let module = device.create_shader_module(&info, None)?;
    Ok(Shader {
        module,
        stage: desc.stage,
        entry_point,
    })
}
