use std::{
    path::Path,
    sync::{
        mpsc::{self, channel},
        Arc, RwLock,
    },
    time::Duration,
};

use anyhow::Context;
use id_arena::{Arena, Id};
use naga::{
    back::wgsl::WriterFlags,
    valid::{Capabilities, ValidationFlags},
};
use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, NagaModuleDescriptor, ShaderLanguage,
};
use notify_debouncer_mini::{
    new_debouncer_opt, notify::*, DebounceEventResult, DebouncedEventKind, Debouncer,
};
use pollster::block_on;
use wgpu::{PollType, RenderPipeline};

pub const SHADER_FOLDER: &str = "assets/shaders";
const SHARED_SHADER_MODULES_FOLDER: &str = "assets/shaders/shared";

pub type PipelineFactory = Box<
    dyn Sync
        + Send
        + Fn(&wgpu::Device, &ShaderDefinition, &str) -> anyhow::Result<wgpu::RenderPipeline>,
>;

#[derive(Debug, Clone)]
pub struct ShaderDefinition {
    pub name: &'static str,
    pub path: &'static str,
}

pub struct ShaderEntry {
    pipeline_id: PipelineId,
    def: ShaderDefinition,
    factory: PipelineFactory,
}

impl ShaderEntry {
    pub fn new(pipeline_id: PipelineId, def: ShaderDefinition, factory: PipelineFactory) -> Self {
        Self {
            pipeline_id,
            def,
            factory,
        }
    }
}

pub type PipelineId = Id<PipelineCacheEntry>;

#[derive(Default)]
pub struct PipelineCacheEntry(Option<wgpu::RenderPipeline>);

impl PipelineCacheEntry {
    pub fn set_pipeline(&mut self, pipeline: wgpu::RenderPipeline) {
        self.0 = Some(pipeline);
    }
}

pub struct PipelineCacheBuilder {
    shaders: Arena<ShaderEntry>,
    pipelines: Arena<PipelineCacheEntry>,
}

impl PipelineCacheBuilder {
    pub fn new() -> Self {
        Self {
            shaders: Arena::new(),
            pipelines: Arena::new(),
        }
    }

    /// Registers a pipeline built from `shader_def`. Several pipelines may
    /// share one shader file; all of them are rebuilt when it changes.
    pub fn add_shader(
        &mut self,
        shader_def: ShaderDefinition,
        factory: PipelineFactory,
    ) -> PipelineId {
        let pipeline_id = self.pipelines.alloc(PipelineCacheEntry::default());
        let shader_entry = ShaderEntry::new(pipeline_id, shader_def, factory);
        self.shaders.alloc(shader_entry);
        pipeline_id
    }

    pub fn build(self) -> PipelineCache {
        PipelineCache {
            shaders: Arc::new(self.shaders),
            pipelines: self.pipelines,
        }
    }
}

pub struct PipelineCache {
    shaders: Arc<Arena<ShaderEntry>>,
    pipelines: Arena<PipelineCacheEntry>,
}

impl PipelineCache {
    /// None until the pipeline has compiled at least once.
    pub fn get(&self, id: PipelineId) -> Option<&RenderPipeline> {
        self.pipelines.get(id).and_then(|entry| entry.0.as_ref())
    }

    fn get_entry_mut(&mut self, id: PipelineId) -> Option<&mut PipelineCacheEntry> {
        self.pipelines.get_mut(id)
    }

    fn iter_shaders_and_pipelines_mut(
        &mut self,
    ) -> impl Iterator<Item = (&ShaderEntry, &mut PipelineCacheEntry)> {
        // add_shader allocates in both arenas, so they stay in step.
        self.shaders
            .iter()
            .map(|(_, shader_entry)| shader_entry)
            .zip(
                self.pipelines
                    .iter_mut()
                    .map(|(_, pipeline_entry)| pipeline_entry),
            )
    }
}

type CompiledPipeline = (&'static str, PipelineId, wgpu::RenderPipeline);

/// Compiles shaders into pipelines and recompiles them on a watcher thread
/// whenever a file under the shader folder changes.
pub struct ShaderLoader {
    pub cache: PipelineCache,
    device: wgpu::Device,
    receiver: mpsc::Receiver<CompiledPipeline>,
    composer: Arc<RwLock<Composer>>,
    _debouncer: Debouncer<notify_debouncer_mini::notify::RecommendedWatcher>,
}

impl ShaderLoader {
    pub fn new(device: wgpu::Device, cache_builder: PipelineCacheBuilder) -> anyhow::Result<Self> {
        let cache = cache_builder.build();

        let (send_new_pipelines, recv_new_pipelines) = channel::<CompiledPipeline>();

        let device_loader = device.clone();

        let composer = create_composer().context("Failed to create shader composer")?;
        let composer = Arc::new(RwLock::new(composer));

        let shaders = cache.shaders.clone();
        let composer_clone = composer.clone();
        let mut debouncer = new_debouncer_opt(
            notify_debouncer_mini::Config::default().with_timeout(Duration::from_millis(100)),
            move |res: DebounceEventResult| match res {
                Ok(events) => {
                    for event in events {
                        if event.kind != DebouncedEventKind::Any {
                            continue;
                        }

                        // A shared module may be imported by anything, so rebuild everything then.
                        let shared_changed = event
                            .path
                            .parent()
                            .is_some_and(|parent| parent.ends_with("shared"));

                        if shared_changed {
                            if let Err(e) = reload_shared_module(&composer_clone, &event.path) {
                                log::error!("Failed to reload shared shader module: {:?}", e);
                                continue;
                            }
                        }

                        let affected = shaders
                            .iter()
                            .map(|(_, entry)| entry)
                            .filter(|entry| shared_changed || event.path.ends_with(entry.def.path));

                        for entry in affected {
                            match compile_file(
                                &device_loader,
                                &entry.def,
                                &entry.factory,
                                &composer_clone,
                            ) {
                                Ok(pipeline) => {
                                    if send_new_pipelines
                                        .send((entry.def.name, entry.pipeline_id, pipeline))
                                        .is_err()
                                    {
                                        return;
                                    }
                                }
                                Err(e) => log::error!("Failed to load shader: {:?}", e),
                            }
                        }
                    }
                }
                Err(e) => log::error!("Error debouncing shader changes: {}", e),
            },
        )
        .context("Failed to create shader file watcher")?;

        let absolute_shader_folder = Path::new(SHADER_FOLDER)
            .canonicalize()
            .with_context(|| format!("Shader folder {} not found", SHADER_FOLDER))?;

        debouncer
            .watcher()
            .watch(&absolute_shader_folder, RecursiveMode::Recursive)
            .context("Failed to watch the shader folder")?;

        let mut shader_loader = Self {
            device,
            cache,
            receiver: recv_new_pipelines,
            composer,
            _debouncer: debouncer,
        };

        shader_loader.create_all_pipelines()?;

        Ok(shader_loader)
    }

    fn create_all_pipelines(&mut self) -> anyhow::Result<()> {
        for (shader, pipeline_entry) in self.cache.iter_shaders_and_pipelines_mut() {
            let pipeline = compile_file(&self.device, &shader.def, &shader.factory, &self.composer)
                .with_context(|| format!("Failed to compile shader: {}", shader.def.name))?;
            pipeline_entry.set_pipeline(pipeline);
        }

        log::info!("Compiled {} pipelines", self.cache.pipelines.len());
        Ok(())
    }

    /// Swaps in pipelines the watcher thread has rebuilt since the last frame.
    pub fn load_pending_shaders(&mut self) {
        while let Ok((name, pipeline_id, pipeline)) = self.receiver.try_recv() {
            if let Some(entry) = self.cache.get_entry_mut(pipeline_id) {
                log::info!("Shader reloaded: {}", name);
                entry.set_pipeline(pipeline);
            }
        }
    }
}

fn compile_file(
    device: &wgpu::Device,
    shader_def: &ShaderDefinition,
    factory: &PipelineFactory,
    composer: &RwLock<Composer>,
) -> anyhow::Result<wgpu::RenderPipeline> {
    let path = Path::new(SHADER_FOLDER).join(shader_def.path);
    let shader_code = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read shader file {}", path.display()))?;

    let file_path = path.to_string_lossy().to_string();

    let module = {
        let mut composer = composer
            .write()
            .map_err(|_| anyhow::anyhow!("Shader composer lock poisoned"))?;

        composer
            .make_naga_module(NagaModuleDescriptor {
                file_path: &file_path,
                source: &shader_code,
                ..Default::default()
            })
            .with_context(|| format!("Failed to compose {}", file_path))?
    };

    // wgpu validates again internally, this pass only feeds the writer.
    let info = naga::valid::Validator::new(ValidationFlags::empty(), Capabilities::all())
        .validate(&module)
        .context("Failed to validate Naga module")?;

    let shader_code = naga::back::wgsl::write_string(&module, &info, WriterFlags::empty())
        .context("Failed to convert Naga module to WGSL string")?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let pipeline = factory(device, shader_def, &shader_code);

    device
        .poll(PollType::Wait)
        .context("Failed to poll device after shader compilation")?;

    if let Some(error) = block_on(device.pop_error_scope()) {
        return Err(anyhow::anyhow!(
            "Shader compilation failed for {}: {}",
            shader_def.name,
            error
        ));
    };

    pipeline
}

fn add_shared_module(composer: &mut Composer, path: &Path) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read shared shader module {}", path.display()))?;

    let file_path = path.to_string_lossy().to_string();

    composer
        .add_composable_module(ComposableModuleDescriptor {
            source: &source,
            file_path: &file_path,
            language: ShaderLanguage::Wgsl,
            ..Default::default()
        })
        .with_context(|| format!("Failed to add shared shader module: {}", file_path))?;

    Ok(())
}

fn is_wgsl(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "wgsl")
}

fn reload_shared_module(composer: &RwLock<Composer>, path: &Path) -> anyhow::Result<()> {
    if !is_wgsl(path) {
        return Ok(());
    }

    let mut composer = composer
        .write()
        .map_err(|_| anyhow::anyhow!("Shader composer lock poisoned"))?;
    // Re-adding a module under the same import path replaces it.
    add_shared_module(&mut composer, path)
}

fn create_composer() -> anyhow::Result<Composer> {
    let shared_files = std::fs::read_dir(SHARED_SHADER_MODULES_FOLDER).with_context(|| {
        format!(
            "Failed to read shared shader modules directory {}",
            SHARED_SHADER_MODULES_FOLDER
        )
    })?;
    let mut composer = Composer::default();

    for entry in shared_files {
        let path = entry?.path();

        if !is_wgsl(&path) {
            continue;
        }

        add_shared_module(&mut composer, &path)?;
    }

    Ok(composer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_wgsl_files_are_shared_modules() {
        let dir = tempfile::tempdir().unwrap();
        let wgsl = dir.path().join("lighting.wgsl");
        let other = dir.path().join("notes.txt");
        std::fs::write(&wgsl, "fn f() {}").unwrap();
        std::fs::write(&other, "").unwrap();

        assert!(is_wgsl(&wgsl));
        assert!(!is_wgsl(&other));
        assert!(!is_wgsl(dir.path()));
    }

    #[test]
    fn shared_lighting_module_composes() {
        let composer = create_composer().unwrap();
        assert!(composer.contains_module("room::lighting"));
    }
}
