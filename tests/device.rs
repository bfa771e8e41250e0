//! Device-surface tests.
//!
//! The handle-semantics tests run anywhere. The end-to-end scenarios need
//! a display server plus a working Vulkan ICD, so they are `#[ignore]`d
//! and run explicitly with `cargo test -- --ignored` on a machine with a
//! GPU.

use opal::*;
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

#[test]
fn null_handles_compare_equal_to_default() {
    assert_eq!(BufferHandle::default(), BufferHandle::NULL);
    assert_eq!(TextureHandle::default(), TextureHandle::NULL);
    assert_eq!(SwapchainHandle::default(), SwapchainHandle::NULL);
    assert!(CommandBufferHandle::default().is_null());
    assert!(PipelineHandle::NULL.is_null());
}

#[test]
fn platform_default_backend_is_vulkan_on_native() {
    if !cfg!(target_arch = "wasm32") {
        assert_eq!(Backend::platform_default(), Backend::Vulkan);
    }
}

fn create_window() -> (EventLoop<()>, Window) {
    #[cfg(target_os = "linux")]
    let event_loop = {
        use winit::platform::x11::EventLoopBuilderExtX11;
        winit::event_loop::EventLoopBuilder::new()
            .with_any_thread(true)
            .build()
            .unwrap()
    };
    #[cfg(not(target_os = "linux"))]
    let event_loop = EventLoop::new().unwrap();

    let window = WindowBuilder::new()
        .with_title("opal tests")
        .with_inner_size(winit::dpi::LogicalSize::new(800, 600))
        .with_visible(false)
        .build(&event_loop)
        .unwrap();
    (event_loop, window)
}

/// A minimal valid SPIR-V module with a single empty entry point.
/// `execution_model` is 0 for vertex, 4 for fragment.
fn stub_spirv(execution_model: u32) -> Vec<u8> {
    let mut words = vec![
        0x0723_0203u32, // magic
        0x0001_0000,    // SPIR-V 1.0
        0x0000_0000,    // generator
        0x0000_0005,    // id bound
        0x0000_0000,    // schema
        0x0002_0011, 0x0000_0001, // OpCapability Shader
        0x0003_000E, 0x0000_0000, 0x0000_0001, // OpMemoryModel Logical GLSL450
        0x0005_000F, execution_model, 0x0000_0001, 0x6E69_616D, 0x0000_0000, // OpEntryPoint %1 "main"
    ];
    if execution_model == 4 {
        // Fragment entry points must declare an origin.
        words.extend([0x0003_0010, 0x0000_0001, 0x0000_0007]); // OpExecutionMode OriginUpperLeft
    }
    words.extend([
        0x0002_0013, 0x0000_0002, // %2 = OpTypeVoid
        0x0003_0021, 0x0000_0003, 0x0000_0002, // %3 = OpTypeFunction %2
        0x0005_0036, 0x0000_0002, 0x0000_0001, 0x0000_0000, 0x0000_0003, // %1 = OpFunction
        0x0002_00F8, 0x0000_0004, // OpLabel
        0x0001_00FD, // OpReturn
        0x0001_0038, // OpFunctionEnd
    ]);
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[test]
#[ignore = "requires a display and a Vulkan driver"]
fn triangle_pipeline_build_and_teardown() {
    let _ = pretty_env_logger::try_init();
    let (_event_loop, window) = create_window();
    let mut gfx = Graphics::new(&window, Backend::Vulkan).unwrap();

    let vert_code = stub_spirv(0);
    let frag_code = stub_spirv(4);
    let vert = gfx.create_shader(&ShaderDesc {
        code: &vert_code,
        stage: ShaderStage::VERTEX,
        entry_point: "",
    });
    let frag = gfx.create_shader(&ShaderDesc {
        code: &frag_code,
        stage: ShaderStage::FRAGMENT,
        entry_point: "main",
    });
    assert!(!vert.is_null());
    assert!(!frag.is_null());

    let group_layout = gfx.create_bind_group_layout(&BindGroupLayoutDesc {
        entries: vec![BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStage::VERTEX,
            ty: BindingType::UniformBuffer,
        }],
    });
    assert!(!group_layout.is_null());

    let layout = gfx.create_pipeline_layout(&PipelineLayoutDesc {
        bind_group_layouts: vec![group_layout],
    });
    assert!(!layout.is_null());

    let pipeline = gfx.create_graphics_pipeline(&GraphicsPipelineDesc {
        vertex_shader: vert,
        fragment_shader: frag,
        layout,
        topology: PrimitiveTopology::TriangleList,
        rasterizer: RasterizerState {
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            wireframe: false,
        },
        color_format: Format::Bgra8Unorm,
        depth_format: Format::Undefined,
        ..Default::default()
    });
    assert!(!pipeline.is_null());

    gfx.destroy_pipeline(pipeline);
    gfx.destroy_pipeline_layout(layout);
    gfx.destroy_bind_group_layout(group_layout);
    gfx.destroy_shader(frag);
    gfx.destroy_shader(vert);

    // Destroying null handles is always a no-op.
    gfx.destroy_pipeline(PipelineHandle::NULL);
    gfx.destroy_shader(ShaderHandle::NULL);
}

#[test]
#[ignore = "requires a display and a Vulkan driver"]
fn buffer_write_then_map_round_trips() {
    let _ = pretty_env_logger::try_init();
    let (_event_loop, window) = create_window();
    let mut gfx = Graphics::new(&window, Backend::Vulkan).unwrap();

    let buffer = gfx.create_buffer(&BufferDesc {
        size: 1024,
        usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
        memory: MemoryUsage::CpuToGpu,
    });
    assert!(!buffer.is_null());

    let pattern: Vec<u8> = (0..1024u32).map(|i| (i * 7 % 251) as u8).collect();
    gfx.write_buffer(buffer, 0, &pattern);

    let mapped = gfx.map_buffer(buffer, 0, 1024).unwrap();
    let contents = unsafe { std::slice::from_raw_parts(mapped.as_ptr(), 1024) };
    assert_eq!(contents, &pattern[..]);
    gfx.unmap_buffer(buffer);

    gfx.destroy_buffer(buffer);
}

#[test]
#[ignore = "requires a display and a Vulkan driver"]
fn command_buffer_record_submit_and_reuse() {
    let _ = pretty_env_logger::try_init();
    let (_event_loop, window) = create_window();
    let mut gfx = Graphics::new(&window, Backend::Vulkan).unwrap();

    let pattern: Vec<u8> = (0..256u32).map(|i| (i * 13 % 251) as u8).collect();
    let src = gfx.create_buffer(&BufferDesc {
        size: 256,
        usage: BufferUsage::COPY_SRC,
        memory: MemoryUsage::CpuToGpu,
    });
    let dst = gfx.create_buffer(&BufferDesc {
        size: 256,
        usage: BufferUsage::COPY_DST,
        memory: MemoryUsage::GpuToCpu,
    });
    assert!(!src.is_null());
    assert!(!dst.is_null());
    gfx.write_buffer(src, 0, &pattern);

    let cmd = gfx.create_command_buffer();
    assert!(!cmd.is_null());
    // Nothing submitted yet, so the buffer reads as complete.
    assert!(gfx.command_buffer_is_complete(cmd));

    // Submit the same command buffer several times; every begin after the
    // first has to throttle on the completion fence before resetting.
    for _ in 0..3 {
        gfx.begin_command_buffer(cmd);
        gfx.cmd_begin_debug_label(cmd, "copy pass");
        gfx.cmd_copy_buffer(cmd, src, 0, dst, 0, 256);
        gfx.cmd_end_debug_label(cmd);
        gfx.end_command_buffer(cmd);
        gfx.submit_command_buffer(cmd);
    }

    gfx.wait_command_buffer(cmd);
    assert!(gfx.command_buffer_is_complete(cmd));

    let mapped = gfx.map_buffer(dst, 0, 256).unwrap();
    let contents = unsafe { std::slice::from_raw_parts(mapped.as_ptr(), 256) };
    assert_eq!(contents, &pattern[..]);
    gfx.unmap_buffer(dst);

    // Destroy with a submission still possibly in flight; the backend has
    // to wait for the fence before tearing the pool down.
    gfx.begin_command_buffer(cmd);
    gfx.cmd_copy_buffer(cmd, src, 0, dst, 0, 256);
    gfx.end_command_buffer(cmd);
    gfx.submit_command_buffer(cmd);
    gfx.destroy_command_buffer(cmd);
    gfx.destroy_command_buffer(CommandBufferHandle::NULL);

    gfx.destroy_buffer(dst);
    gfx.destroy_buffer(src);
}

#[test]
#[ignore = "requires a display and a Vulkan driver"]
fn gpu_only_write_goes_through_the_staging_ring() {
    let _ = pretty_env_logger::try_init();
    let (_event_loop, window) = create_window();
    let mut gfx = Graphics::new(&window, Backend::Vulkan).unwrap();

    let device_local = gfx.create_buffer(&BufferDesc {
        size: 512,
        usage: BufferUsage::STORAGE | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
        memory: MemoryUsage::GpuOnly,
    });
    let readback = gfx.create_buffer(&BufferDesc {
        size: 512,
        usage: BufferUsage::COPY_DST,
        memory: MemoryUsage::GpuToCpu,
    });
    assert!(!device_local.is_null());
    assert!(!readback.is_null());

    // Several writes in a row cycle through every upload-ring slot.
    let pattern: Vec<u8> = (0..512u32).map(|i| (i * 31 % 251) as u8).collect();
    gfx.write_buffer(device_local, 0, &[0u8; 512]);
    gfx.write_buffer(device_local, 0, &[0xABu8; 512]);
    gfx.write_buffer(device_local, 0, &pattern);
    // Uploads are asynchronous; drain them before reading the result back.
    gfx.wait_idle();

    let cmd = gfx.create_command_buffer();
    gfx.begin_command_buffer(cmd);
    gfx.cmd_copy_buffer(cmd, device_local, 0, readback, 0, 512);
    gfx.end_command_buffer(cmd);
    gfx.submit_command_buffer(cmd);
    gfx.wait_command_buffer(cmd);

    let mapped = gfx.map_buffer(readback, 0, 512).unwrap();
    let contents = unsafe { std::slice::from_raw_parts(mapped.as_ptr(), 512) };
    assert_eq!(contents, &pattern[..]);
    gfx.unmap_buffer(readback);

    gfx.destroy_command_buffer(cmd);
    gfx.destroy_buffer(readback);
    gfx.destroy_buffer(device_local);
}

#[test]
#[ignore = "requires a display and a Vulkan driver"]
fn swapchain_create_resize_present() {
    let _ = pretty_env_logger::try_init();
    let (_event_loop, window) = create_window();
    let mut gfx = Graphics::new(&window, Backend::Vulkan).unwrap();

    let swapchain = gfx.create_swapchain(
        &window,
        &SwapchainDesc {
            format: Format::Bgra8Unorm,
            width: 800,
            height: 600,
            vsync: true,
        },
    );
    assert!(!swapchain.is_null());

    let count = gfx.swapchain_texture_count(swapchain);
    assert!(count >= 2);
    for index in 0..count {
        assert!(!gfx.swapchain_texture(swapchain, index).is_null());
    }
    assert!(gfx.swapchain_texture(swapchain, count).is_null());

    gfx.resize_swapchain(swapchain, 1280, 720);
    let resized_count = gfx.swapchain_texture_count(swapchain);
    assert!(resized_count >= 2);

    gfx.destroy_swapchain(swapchain);
    gfx.destroy_swapchain(SwapchainHandle::NULL);
}

#[test]
#[ignore = "requires a display and a Vulkan driver"]
fn device_reports_limits_and_features() {
    let _ = pretty_env_logger::try_init();
    let (_event_loop, window) = create_window();
    let gfx = Graphics::new(&window, Backend::Vulkan).unwrap();

    let limits = gfx.limits();
    assert!(limits.max_image_dimension_2d >= 4096);
    // The fixed push-constant range must fit every conformant device.
    assert!(limits.max_push_constant_size >= PUSH_CONSTANT_SIZE);
}
