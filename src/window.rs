use std::{sync::Arc, time::Instant};

use anyhow::Context;
use glam::Vec2;
use imgui::{FontConfig, FontSource};
use imgui_winit_support::WinitPlatform;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

use crate::{config::RoomConfig, engine, rendering::renderer::Renderer, room::RoomState};

/// Pixels of touchpad scrolling that count as one wheel step.
const PIXELS_PER_SCROLL_STEP: f32 = 50.0;

struct ImguiState {
    context: imgui::Context,
    platform: WinitPlatform,
}

struct App {
    config: Option<RoomConfig>,
    renderer: Option<Renderer>,
    room: Option<RoomState>,
    imgui: Option<ImguiState>,
    last_frame: Instant,
}

impl App {
    fn new(config: RoomConfig) -> Self {
        Self {
            config: Some(config),
            renderer: None,
            room: None,
            imgui: None,
            last_frame: Instant::now(),
        }
    }

    fn setup_imgui(&mut self, window: &Window) {
        let mut context = imgui::Context::create();
        let mut platform = WinitPlatform::new(&mut context);
        platform.attach_window(
            context.io_mut(),
            window,
            imgui_winit_support::HiDpiMode::Default,
        );

        let font_size = 14.0;
        context.fonts().add_font(&[FontSource::DefaultFontData {
            config: Some(FontConfig {
                oversample_h: 1,
                pixel_snap_h: true,
                size_pixels: font_size,
                ..Default::default()
            }),
        }]);

        // The published imgui crate mishandles ini files.
        context.set_ini_filename(None);

        self.imgui = Some(ImguiState { context, platform });
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attributes = Window::default_attributes()
            .with_title("Living Room")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("Failed to create window")?,
        );

        self.setup_imgui(&window);

        let config = self.config.take().unwrap_or_default();
        let size = window.inner_size();
        let room = RoomState::new(config, size.width.max(1), size.height.max(1));

        let imgui = self
            .imgui
            .as_mut()
            .context("Imgui is not initialized")?;
        let renderer = pollster::block_on(Renderer::new(window, &room, &mut imgui.context))?;

        renderer.window.request_redraw();
        self.room = Some(room);
        self.renderer = Some(renderer);

        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }

        if let Err(e) = self.start(event_loop) {
            log::error!("Failed to start: {:?}", e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let (Some(imgui), Some(renderer), Some(room)) = (
            self.imgui.as_mut(),
            self.renderer.as_mut(),
            self.room.as_mut(),
        ) else {
            return;
        };

        let wants_mouse = imgui.context.io().want_capture_mouse;

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                renderer.resize(new_size);
                room.resize(new_size.width, new_size.height);
            }
            WindowEvent::RedrawRequested => {
                let delta_time = self.last_frame.elapsed();
                let now = Instant::now();
                imgui.context.io_mut().update_delta_time(delta_time);
                self.last_frame = now;

                renderer.window.request_redraw();

                if let Err(e) = imgui
                    .platform
                    .prepare_frame(imgui.context.io_mut(), &renderer.window)
                {
                    log::error!("Failed to prepare imgui frame: {}", e);
                    return;
                }

                let ui = imgui.context.new_frame();

                if let Err(e) = engine::update(room, ui, delta_time.as_secs_f32()) {
                    log::error!("Error during engine::update: {:?}", e);
                }

                imgui.platform.prepare_render(ui, &renderer.window);

                match renderer.render(room) {
                    Ok(frame) => {
                        renderer.finish_frame(frame, &mut imgui.context);
                    }
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        renderer.resize(renderer.size);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of memory");
                        event_loop.exit();
                    }
                    Err(wgpu::SurfaceError::Timeout) => {
                        log::warn!("Timeout");
                    }
                    Err(other) => {
                        log::error!("Unexpected error: {:?}", other);
                    }
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let pressed = state == ElementState::Pressed;
                // Releases always go through so a drag never gets stuck.
                if !pressed || !wants_mouse {
                    room.orbit.on_rotate_button(pressed);
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                let pressed = state == ElementState::Pressed;
                if !pressed || !wants_mouse {
                    room.orbit.on_pan_button(pressed);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                room.orbit
                    .on_pointer_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::MouseWheel { delta, .. } if !wants_mouse => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => {
                        position.y as f32 / PIXELS_PER_SCROLL_STEP
                    }
                };
                room.orbit.on_scroll(steps);
            }
            _ => (),
        }

        imgui.platform.handle_event::<()>(
            imgui.context.io_mut(),
            &renderer.window,
            &Event::WindowEvent { window_id, event },
        );
    }
}

pub async fn run() -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let config = RoomConfig::from_env();
    log::info!("Loading assets from {}", config.asset_root.display());

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
