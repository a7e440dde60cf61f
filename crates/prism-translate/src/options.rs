use core::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stage a module's entry point runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    TessControl,
    TessEvaluation,
    Compute,
}

impl ShaderStage {
    pub fn from_execution_model(model: spirv::ExecutionModel) -> Option<Self> {
        use spirv::ExecutionModel as M;
        Some(match model {
            M::Vertex => Self::Vertex,
            M::Fragment => Self::Fragment,
            M::Geometry => Self::Geometry,
            M::TessellationControl => Self::TessControl,
            M::TessellationEvaluation => Self::TessEvaluation,
            M::GLCompute | M::Kernel => Self::Compute,
            _ => return None,
        })
    }
}

/// OpenGL-style output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GlslOptions {
    /// `#version` number, e.g. 100, 110, 300, 330.
    pub version: u32,
    /// OpenGL ES dialect; adds a default float precision.
    pub es: bool,
    /// Use `mediump` instead of `highp` as the ES default precision.
    pub relaxed_precision: bool,
    /// Replacement for a fragment output named `gl_FragColor` once `gl_FragColor` is no longer
    /// available (modern versions).
    pub frag_color_name: String,
}

impl GlslOptions {
    /// `in`/`out` interface qualifiers and `texture()` replace `attribute`/`varying`/`texture2D()`
    /// from this version on.
    pub fn is_modern(&self) -> bool {
        if self.es {
            self.version >= 300
        } else {
            self.version >= 130
        }
    }

    /// Named uniform blocks exist from this version on; older versions get loose uniforms.
    pub fn has_uniform_blocks(&self) -> bool {
        if self.es {
            self.version >= 300
        } else {
            self.version >= 140
        }
    }

    pub fn has_explicit_locations(&self) -> bool {
        if self.es {
            self.version >= 300
        } else {
            self.version >= 330
        }
    }
}

impl Default for GlslOptions {
    fn default() -> Self {
        Self {
            version: 330,
            es: false,
            relaxed_precision: false,
            frag_color_name: "prism_FragColor".to_owned(),
        }
    }
}

/// Direct3D-style output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct HlslOptions {
    /// Major shader model: 9 emits SM3 conventions (`POSITION`, loose uniforms, view adjust);
    /// 10 and up emit `SV_POSITION` and `cbuffer` blocks.
    pub shader_model: u32,
}

impl HlslOptions {
    pub fn is_sm3(&self) -> bool {
        self.shader_model <= 9
    }
}

impl Default for HlslOptions {
    fn default() -> Self {
        Self { shader_model: 11 }
    }
}

/// Render-state facts the Metal backend folds into generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderContext {
    /// Negate clip-space Y before returning from a vertex entry point.
    pub flip_vertex_y: bool,
    /// Sample 2D textures at `1 - y`.
    pub flip_fragment_y: bool,
    /// The vertex stage feeds point primitives, so `[[point_size]]` must be written.
    pub rendering_points: bool,
}

/// One vertex attribute inside a [`VertexBufferLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexAttributeLayout {
    pub location: u32,
    /// Byte offset of the attribute inside one vertex.
    pub offset: u32,
}

/// A vertex buffer fetched manually through a `device` pointer rather than `[[stage_in]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexBufferLayout {
    pub binding: u32,
    /// Bytes between consecutive vertices (or instances).
    pub stride: u32,
    /// Indexed by instance id instead of vertex id.
    #[serde(default)]
    pub per_instance: bool,
    pub attributes: Vec<VertexAttributeLayout>,
}

/// Apple Metal-style output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MetalOptions {
    pub render: RenderContext,
    /// When non-empty, vertex inputs are read from these buffers instead of a stage-in struct.
    pub vertex_buffers: Vec<VertexBufferLayout>,
    /// Inlined expressions longer than this are written to a named temporary.
    pub inline_limit: usize,
}

impl Default for MetalOptions {
    fn default() -> Self {
        Self {
            render: RenderContext::default(),
            vertex_buffers: Vec::new(),
            inline_limit: 120,
        }
    }
}

/// Output language plus its options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "lang", rename_all = "lowercase")]
pub enum Target {
    Glsl(GlslOptions),
    Hlsl(HlslOptions),
    Metal(MetalOptions),
    /// Re-serializes the decoded module verbatim.
    SpirV,
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Glsl(_) => "glsl",
            Self::Hlsl(_) => "hlsl",
            Self::Metal(_) => "metal",
            Self::SpirV => "spirv",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Glsl(o) if o.es => write!(f, "glsl {} es", o.version),
            Self::Glsl(o) => write!(f, "glsl {}", o.version),
            Self::Hlsl(o) => write!(f, "hlsl sm{}", o.shader_model),
            Self::Metal(_) => f.write_str("metal"),
            Self::SpirV => f.write_str("spirv"),
        }
    }
}

/// Options shared by every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateOptions {
    /// Overrides the stage derived from the module's first `OpEntryPoint`.
    pub stage: Option<ShaderStage>,
    /// Renumber `Binding` decorations before translating. Never applied to [`Target::SpirV`].
    pub normalize_bindings: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            stage: None,
            normalize_bindings: true,
        }
    }
}
