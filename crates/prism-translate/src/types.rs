use bitflags::bitflags;
use spirv::{Dim, StorageClass};

/// A SPIR-V result id.
pub type Id = u32;

bitflags! {
    /// Properties of an `OpTypeImage` beyond its dimensionality.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ImageFlags: u8 {
        const DEPTH = 1 << 0;
        const ARRAYED = 1 << 1;
        const MULTISAMPLED = 1 << 2;
        /// Read/write storage image (`Sampled` operand of 2).
        const STORAGE = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
}

impl Scalar {
    pub fn byte_size(self) -> u32 {
        match self {
            Self::Bool => 4,
            Self::Int { width, .. } | Self::Float { width } => width / 8,
        }
    }
}

/// Target-agnostic description of a SPIR-V type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    Scalar(Scalar),
    Vector {
        component: Id,
        count: u32,
    },
    Matrix {
        column: Id,
        columns: u32,
    },
    /// `length` is `None` for runtime arrays and for lengths that are not plain constants.
    Array {
        element: Id,
        length: Option<u32>,
    },
    Struct {
        members: Vec<Id>,
    },
    Image {
        sampled: Id,
        dim: Dim,
        flags: ImageFlags,
    },
    Sampler,
    SampledImage {
        image: Id,
    },
    Pointer {
        storage: StorageClass,
        pointee: Id,
    },
    Function {
        result: Id,
        parameters: Vec<Id>,
    },
    /// Sentinel for ids with no type declaration.
    Unknown,
}

impl TypeKind {
    pub fn is_opaque(&self) -> bool {
        matches!(
            self,
            Self::Image { .. } | Self::Sampler | Self::SampledImage { .. }
        )
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    /// Component/column/element/member count; scalars and unknown types count as 1.
    pub fn length(&self) -> u32 {
        match self {
            Self::Vector { count, .. } => *count,
            Self::Matrix { columns, .. } => *columns,
            Self::Array { length, .. } => length.unwrap_or(1),
            Self::Struct { members } => members.len() as u32,
            _ => 1,
        }
    }
}

/// Swizzle letter for vector component `index`.
pub fn component_name(index: u32) -> Option<char> {
    match index {
        0 => Some('x'),
        1 => Some('y'),
        2 => Some('z'),
        3 => Some('w'),
        _ => None,
    }
}
