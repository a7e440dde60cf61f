//! The symbol model: per-id tables filled in while instructions are walked.
//!
//! Every lookup tolerates absent keys and returns a sentinel (unknown type, empty variable,
//! `_<id>` reference), because decorations and names may arrive before or after the declaration
//! they describe.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use prism_spirv::Instruction;
use spirv::{BuiltIn, Decoration, Dim, ExecutionModel, Op, StorageClass};

use crate::error::TranslateError;
use crate::types::{Id, ImageFlags, Scalar, TypeKind};

static UNKNOWN_TYPE: TypeKind = TypeKind::Unknown;

/// Reads operand `index`, failing when the instruction is too short.
pub(crate) fn operand(inst: &Instruction, index: usize) -> Result<u32, TranslateError> {
    inst.operand(index)
        .ok_or_else(|| TranslateError::CorruptModule {
            id: inst.operands.get(1).copied().unwrap_or(0),
            opcode: inst.opcode,
            reason: format!("missing operand {index}"),
        })
}

pub(crate) fn corrupt(inst: &Instruction, id: Id, reason: impl Into<String>) -> TranslateError {
    TranslateError::CorruptModule {
        id,
        opcode: inst.opcode,
        reason: reason.into(),
    }
}

/// Descriptor-slot indices the Metal backend assigns once, before emitting anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceSlots {
    pub buffer: Option<u32>,
    pub texture: Option<u32>,
    pub sampler: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct Variable {
    /// Pointee type (the variable's value type), not the pointer type.
    pub ty: Id,
    /// `None` until the `OpVariable` itself has been seen; decorations can come first.
    pub storage: Option<StorageClass>,
    pub builtin: Option<BuiltIn>,
    /// Set once the backend has written the declaration.
    pub declared: bool,
    pub location: Option<u32>,
    pub binding: Option<u32>,
    pub descriptor_set: Option<u32>,
    pub offset: Option<u32>,
    pub stride: Option<u32>,
    pub per_instance: bool,
    /// Vertex buffer the attribute is fetched from, when not using stage-in.
    pub vertex_buffer: Option<u32>,
    pub resource: ResourceSlots,
    /// Block members are addressed as bare globals (flattened uniform blocks, `cbuffer`).
    pub flattened: bool,
    /// Declared inside a function body.
    pub local: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Member {
    pub name: Option<String>,
    pub ty: Id,
    pub builtin: Option<BuiltIn>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Bool(bool),
    /// Raw literal bits, up to 64 wide.
    Scalar {
        ty: Id,
        bits: u64,
    },
    Composite {
        ty: Id,
        parts: Vec<Id>,
    },
    Null {
        ty: Id,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub model: ExecutionModel,
    pub function: Id,
    pub name: String,
    pub interface: Vec<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionModeDecl {
    pub function: Id,
    pub mode: u32,
    pub literals: Vec<u32>,
}

/// A partially updated composite whose store can be narrowed to one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeInsert {
    /// Variable the base composite was loaded from.
    pub pointer: Id,
    /// Component path such as `.x` or `[2].y`.
    pub path: String,
    pub object: Id,
}

/// A flattened shader interface entry: either a plain variable or one builtin member of a
/// per-vertex block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceVariable {
    pub id: Id,
    pub name: String,
    pub ty: Id,
    pub builtin: Option<BuiltIn>,
    pub location: Option<u32>,
    pub member: Option<u32>,
}

#[derive(Debug, Default)]
pub struct Symbols {
    id_bound: u32,
    types: HashMap<Id, TypeKind>,
    /// Type ids in declaration order.
    type_order: Vec<Id>,
    names: HashMap<Id, String>,
    variables: BTreeMap<Id, Variable>,
    members: BTreeMap<(Id, u32), Member>,
    references: HashMap<Id, String>,
    constants: HashMap<Id, Constant>,
    value_types: HashMap<Id, Id>,
    block_types: HashSet<Id>,
    array_strides: HashMap<Id, u32>,
    strings: HashMap<Id, String>,
    ext_sets: HashMap<Id, String>,
    loaded_from: HashMap<Id, Id>,
    sampled_images: HashMap<Id, (Id, Id)>,
    composite_inserts: HashMap<Id, CompositeInsert>,
    pub entry_points: Vec<EntryPoint>,
    pub execution_modes: Vec<ExecutionModeDecl>,
}

impl Symbols {
    pub fn new(id_bound: u32) -> Self {
        Self {
            id_bound,
            ..Self::default()
        }
    }

    pub fn id_bound(&self) -> u32 {
        self.id_bound
    }

    /// Fails for id 0 and ids at or past the module's declared bound.
    pub fn check_id(&self, inst: &Instruction, id: Id) -> Result<Id, TranslateError> {
        if id == 0 || id >= self.id_bound {
            return Err(corrupt(
                inst,
                id,
                format!("id {id} is outside the module bound {}", self.id_bound),
            ));
        }
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    pub fn type_kind(&self, ty: Id) -> &TypeKind {
        self.types.get(&ty).unwrap_or(&UNKNOWN_TYPE)
    }

    pub fn has_type(&self, ty: Id) -> bool {
        self.types.contains_key(&ty)
    }

    fn require_type(&self, inst: &Instruction, ty: Id) -> Result<&TypeKind, TranslateError> {
        self.types
            .get(&ty)
            .ok_or_else(|| corrupt(inst, ty, format!("type %{ty} was never declared")))
    }

    pub fn scalar(&self, ty: Id) -> Option<Scalar> {
        match self.type_kind(ty) {
            TypeKind::Scalar(scalar) => Some(*scalar),
            TypeKind::Vector { component, .. } => self.scalar(*component),
            TypeKind::Matrix { column, .. } => self.scalar(*column),
            _ => None,
        }
    }

    /// Struct types in declaration order, so members are always defined before use.
    pub fn struct_types(&self) -> Vec<Id> {
        self.type_order
            .iter()
            .copied()
            .filter(|ty| self.type_kind(*ty).is_struct())
            .collect()
    }

    /// Rows of a matrix type (the component count of its column vector).
    pub fn matrix_rows(&self, ty: Id) -> u32 {
        match self.type_kind(ty) {
            TypeKind::Matrix { column, .. } => self.type_kind(*column).length(),
            _ => 1,
        }
    }

    /// Pointee of a pointer type, or `ty` itself for non-pointers.
    pub fn deref(&self, ty: Id) -> Id {
        match self.type_kind(ty) {
            TypeKind::Pointer { pointee, .. } => *pointee,
            _ => ty,
        }
    }

    pub fn is_block(&self, ty: Id) -> bool {
        self.block_types.contains(&ty)
    }

    /// A struct with builtin members, i.e. `gl_PerVertex`.
    pub fn is_builtin_block(&self, ty: Id) -> bool {
        match self.type_kind(ty) {
            TypeKind::Struct { members } => (0..members.len() as u32)
                .any(|index| self.member(ty, index).builtin.is_some()),
            _ => false,
        }
    }

    /// Image dimensionality and flags behind an image, sampled image, or array of either.
    pub fn image_info(&self, ty: Id) -> Option<(Dim, ImageFlags)> {
        match self.type_kind(ty) {
            TypeKind::Image { dim, flags, .. } => Some((*dim, *flags)),
            TypeKind::SampledImage { image } => self.image_info(*image),
            TypeKind::Array { element, .. } => self.image_info(*element),
            _ => None,
        }
    }

    /// Size in bytes, honouring `Offset`/`ArrayStride` decorations where present. `None` when the
    /// size does not fit in a `u32`.
    pub fn byte_size(&self, ty: Id) -> Option<u32> {
        match self.type_kind(ty) {
            TypeKind::Scalar(scalar) => Some(scalar.byte_size()),
            TypeKind::Vector { component, count } => {
                self.byte_size(*component)?.checked_mul(*count)
            }
            TypeKind::Matrix { column, columns } => self.byte_size(*column)?.checked_mul(*columns),
            TypeKind::Array { element, length } => {
                let stride = match self.array_strides.get(&ty) {
                    Some(&stride) => stride,
                    None => self.byte_size(*element)?,
                };
                stride.checked_mul(length.unwrap_or(0))
            }
            TypeKind::Struct { members } => {
                let mut end = 0;
                let mut cursor = 0;
                for (index, &member_ty) in members.iter().enumerate() {
                    let start = self
                        .member(ty, index as u32)
                        .offset
                        .unwrap_or(cursor);
                    cursor = start.checked_add(self.byte_size(member_ty)?)?;
                    end = end.max(cursor);
                }
                Some(end)
            }
            _ => Some(0),
        }
    }

    /// Target-agnostic type description, e.g. `vec3<float>` or `float[4]`.
    pub fn describe(&self, ty: Id) -> String {
        match self.type_kind(ty) {
            TypeKind::Void => "void".to_owned(),
            TypeKind::Scalar(Scalar::Bool) => "bool".to_owned(),
            TypeKind::Scalar(Scalar::Int { signed: true, .. }) => "int".to_owned(),
            TypeKind::Scalar(Scalar::Int { signed: false, .. }) => "uint".to_owned(),
            TypeKind::Scalar(Scalar::Float { width: 64 }) => "double".to_owned(),
            TypeKind::Scalar(Scalar::Float { .. }) => "float".to_owned(),
            TypeKind::Vector { component, count } => {
                format!("vec{count}<{}>", self.describe(*component))
            }
            TypeKind::Matrix { column, columns } => format!(
                "mat{columns}x{}<{}>",
                self.type_kind(*column).length(),
                self.describe(self.column_component(*column))
            ),
            TypeKind::Array {
                element,
                length: Some(length),
            } => format!("{}[{length}]", self.describe(*element)),
            TypeKind::Array { element, .. } => format!("{}[]", self.describe(*element)),
            TypeKind::Struct { .. } => match self.name(ty) {
                Some(name) => format!("struct {name}"),
                None => format!("struct _{ty}"),
            },
            TypeKind::Image { dim, .. } => format!("image{dim:?}"),
            TypeKind::Sampler => "sampler".to_owned(),
            TypeKind::SampledImage { image } => format!("sampled_{}", self.describe(*image)),
            TypeKind::Pointer { pointee, .. } => format!("ptr<{}>", self.describe(*pointee)),
            TypeKind::Function { .. } => "function".to_owned(),
            TypeKind::Unknown => "unknown".to_owned(),
        }
    }

    fn column_component(&self, column: Id) -> Id {
        match self.type_kind(column) {
            TypeKind::Vector { component, .. } => *component,
            _ => column,
        }
    }

    // ---------------------------------------------------------------------
    // Names, members, variables
    // ---------------------------------------------------------------------

    pub fn name(&self, id: Id) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Debug name with any mangled signature suffix (`foo(vf4;`) removed, or `_<id>`.
    pub fn display_name(&self, id: Id) -> String {
        match self.name(id) {
            Some(name) => name.split('(').next().unwrap_or(name).to_owned(),
            None => format!("_{id}"),
        }
    }

    pub fn member(&self, ty: Id, index: u32) -> Member {
        self.members.get(&(ty, index)).cloned().unwrap_or_default()
    }

    pub fn member_name(&self, ty: Id, index: u32) -> String {
        self.members
            .get(&(ty, index))
            .and_then(|member| member.name.clone())
            .unwrap_or_else(|| format!("_m{index}"))
    }

    pub fn variable(&self, id: Id) -> Option<&Variable> {
        self.variables.get(&id).filter(|v| v.storage.is_some())
    }

    pub fn variable_mut(&mut self, id: Id) -> Option<&mut Variable> {
        self.variables.get_mut(&id).filter(|v| v.storage.is_some())
    }

    /// Declared module-scope variables in id order.
    pub fn globals(&self) -> impl Iterator<Item = (Id, &Variable)> {
        self.variables
            .iter()
            .filter(|(_, v)| v.storage.is_some() && !v.local)
            .map(|(&id, v)| (id, v))
    }

    pub fn global_ids(&self) -> Vec<Id> {
        self.globals().map(|(id, _)| id).collect()
    }

    /// Inputs or outputs of `storage`, with per-vertex blocks expanded to their builtin members.
    pub fn interface(&self, storage: StorageClass) -> Vec<InterfaceVariable> {
        let mut out = Vec::new();
        for (id, var) in self.globals() {
            if var.storage != Some(storage) {
                continue;
            }
            if self.is_builtin_block(var.ty) {
                let count = self.type_kind(var.ty).length();
                for index in 0..count {
                    let member = self.member(var.ty, index);
                    if let Some(builtin) = member.builtin {
                        out.push(InterfaceVariable {
                            id,
                            name: self.member_name(var.ty, index),
                            ty: member.ty,
                            builtin: Some(builtin),
                            location: None,
                            member: Some(index),
                        });
                    }
                }
                continue;
            }
            let builtin_array = matches!(
                self.type_kind(var.ty),
                TypeKind::Array { element, .. } if self.is_builtin_block(*element)
            );
            if builtin_array {
                // gl_in / gl_out arrays are implicit in every target that supports them.
                continue;
            }
            out.push(InterfaceVariable {
                id,
                name: self.display_name(id),
                ty: var.ty,
                builtin: var.builtin,
                location: var.location,
                member: None,
            });
        }
        out
    }

    // ---------------------------------------------------------------------
    // Values and references
    // ---------------------------------------------------------------------

    /// The expression text standing for `id`; `_<id>` when nothing was recorded.
    pub fn reference(&self, id: Id) -> String {
        match self.references.get(&id) {
            Some(text) => text.clone(),
            None => format!("_{id}"),
        }
    }

    pub fn has_reference(&self, id: Id) -> bool {
        self.references.contains_key(&id)
    }

    /// Records the expression for a freshly defined id. Result ids are unique, so a second
    /// definition means the module is corrupt.
    pub fn define(
        &mut self,
        inst: &Instruction,
        id: Id,
        text: String,
    ) -> Result<(), TranslateError> {
        if self.references.contains_key(&id) {
            return Err(corrupt(inst, id, format!("result id %{id} defined twice")));
        }
        self.references.insert(id, text);
        Ok(())
    }

    /// Rebinds a variable's expression. Only stores through call temporaries and the
    /// backends' declaration phase do this.
    pub fn rebind(&mut self, id: Id, text: String) {
        self.references.insert(id, text);
    }

    pub fn value_type(&self, id: Id) -> Id {
        self.value_types.get(&id).copied().unwrap_or(0)
    }

    pub fn set_value_type(&mut self, id: Id, ty: Id) {
        self.value_types.insert(id, ty);
    }

    pub fn constant(&self, id: Id) -> Option<&Constant> {
        self.constants.get(&id)
    }

    /// Integer value of a scalar constant, as used by array lengths and access-chain indices.
    pub fn constant_u32(&self, id: Id) -> Option<u32> {
        match self.constants.get(&id)? {
            Constant::Scalar { bits, .. } => Some(*bits as u32),
            Constant::Bool(b) => Some(u32::from(*b)),
            Constant::Null { .. } => Some(0),
            Constant::Composite { .. } => None,
        }
    }

    pub fn string(&self, id: Id) -> Option<&str> {
        self.strings.get(&id).map(String::as_str)
    }

    pub fn ext_set(&self, id: Id) -> Option<&str> {
        self.ext_sets.get(&id).map(String::as_str)
    }

    pub fn loaded_from(&self, id: Id) -> Option<Id> {
        self.loaded_from.get(&id).copied()
    }

    pub fn set_loaded_from(&mut self, value: Id, pointer: Id) {
        self.loaded_from.insert(value, pointer);
    }

    pub fn sampled_image(&self, id: Id) -> Option<(Id, Id)> {
        self.sampled_images.get(&id).copied()
    }

    pub fn set_sampled_image(&mut self, id: Id, image: Id, sampler: Id) {
        self.sampled_images.insert(id, (image, sampler));
    }

    pub fn composite_insert(&self, id: Id) -> Option<&CompositeInsert> {
        self.composite_inserts.get(&id)
    }

    pub fn set_composite_insert(&mut self, id: Id, insert: CompositeInsert) {
        self.composite_inserts.insert(id, insert);
    }

    pub fn entry_point(&self) -> Option<&EntryPoint> {
        self.entry_points.first()
    }

    pub fn execution_modes(&self, function: Id) -> impl Iterator<Item = &ExecutionModeDecl> {
        self.execution_modes
            .iter()
            .filter(move |mode| mode.function == function)
    }

    // ---------------------------------------------------------------------
    // Declaration bookkeeping
    // ---------------------------------------------------------------------

    /// Applies a declaration instruction to the tables. Non-declarations are ignored.
    pub fn record(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let Some(op) = inst.op() else {
            return Ok(());
        };
        match op {
            Op::Name => {
                let target = operand(inst, 0)?;
                if let Some(name) = inst.string.as_deref().filter(|n| !n.is_empty()) {
                    self.names.insert(target, name.to_owned());
                }
            }
            Op::MemberName => {
                let ty = operand(inst, 0)?;
                let index = operand(inst, 1)?;
                if let Some(name) = inst.string.as_deref().filter(|n| !n.is_empty()) {
                    self.members.entry((ty, index)).or_default().name = Some(name.to_owned());
                }
            }
            Op::String => {
                let id = operand(inst, 0)?;
                self.strings
                    .insert(id, inst.string.clone().unwrap_or_default());
            }
            Op::ExtInstImport => {
                let id = operand(inst, 0)?;
                self.ext_sets
                    .insert(id, inst.string.clone().unwrap_or_default());
            }
            Op::EntryPoint => {
                let model = operand(inst, 0)?;
                let function = operand(inst, 1)?;
                let model = ExecutionModel::from_u32(model).ok_or_else(|| {
                    corrupt(inst, function, format!("unknown execution model {model}"))
                })?;
                self.entry_points.push(EntryPoint {
                    model,
                    function,
                    name: inst.string.clone().unwrap_or_default(),
                    interface: inst.operands_after_string().to_vec(),
                });
            }
            Op::ExecutionMode => {
                self.execution_modes.push(ExecutionModeDecl {
                    function: operand(inst, 0)?,
                    mode: operand(inst, 1)?,
                    literals: inst.operands.get(2..).unwrap_or(&[]).to_vec(),
                });
            }
            Op::Decorate => self.record_decoration(inst)?,
            Op::MemberDecorate => self.record_member_decoration(inst)?,
            Op::TypeVoid
            | Op::TypeBool
            | Op::TypeInt
            | Op::TypeFloat
            | Op::TypeVector
            | Op::TypeMatrix
            | Op::TypeImage
            | Op::TypeSampler
            | Op::TypeSampledImage
            | Op::TypeArray
            | Op::TypeRuntimeArray
            | Op::TypeStruct
            | Op::TypePointer
            | Op::TypeFunction => self.record_type(op, inst)?,
            Op::Constant | Op::SpecConstant => {
                let ty = operand(inst, 0)?;
                let id = operand(inst, 1)?;
                self.require_type(inst, ty)?;
                let low = u64::from(operand(inst, 2)?);
                let high = u64::from(inst.operand(3).unwrap_or(0));
                self.constants.insert(
                    id,
                    Constant::Scalar {
                        ty,
                        bits: low | (high << 32),
                    },
                );
                self.value_types.insert(id, ty);
            }
            Op::ConstantTrue | Op::ConstantFalse | Op::SpecConstantTrue | Op::SpecConstantFalse => {
                let ty = operand(inst, 0)?;
                let id = operand(inst, 1)?;
                let value = matches!(op, Op::ConstantTrue | Op::SpecConstantTrue);
                self.constants.insert(id, Constant::Bool(value));
                self.value_types.insert(id, ty);
            }
            Op::ConstantComposite | Op::SpecConstantComposite => {
                let ty = operand(inst, 0)?;
                let id = operand(inst, 1)?;
                self.require_type(inst, ty)?;
                let parts = inst.operands[2..].to_vec();
                for &part in &parts {
                    self.check_id(inst, part)?;
                }
                self.constants.insert(id, Constant::Composite { ty, parts });
                self.value_types.insert(id, ty);
            }
            Op::ConstantNull => {
                let ty = operand(inst, 0)?;
                let id = operand(inst, 1)?;
                self.require_type(inst, ty)?;
                self.constants.insert(id, Constant::Null { ty });
                self.value_types.insert(id, ty);
            }
            Op::Variable => self.record_variable(inst)?,
            _ => {}
        }
        Ok(())
    }

    fn record_type(&mut self, op: Op, inst: &Instruction) -> Result<(), TranslateError> {
        let id = operand(inst, 0)?;
        self.check_id(inst, id)?;
        let kind = match op {
            Op::TypeVoid => TypeKind::Void,
            Op::TypeBool => TypeKind::Scalar(Scalar::Bool),
            Op::TypeInt => TypeKind::Scalar(Scalar::Int {
                width: operand(inst, 1)?,
                signed: operand(inst, 2)? != 0,
            }),
            Op::TypeFloat => TypeKind::Scalar(Scalar::Float {
                width: operand(inst, 1)?,
            }),
            Op::TypeVector => {
                let component = operand(inst, 1)?;
                self.require_type(inst, component)?;
                TypeKind::Vector {
                    component,
                    count: operand(inst, 2)?,
                }
            }
            Op::TypeMatrix => {
                let column = operand(inst, 1)?;
                if !matches!(self.require_type(inst, column)?, TypeKind::Vector { .. }) {
                    return Err(corrupt(inst, id, "matrix column type is not a vector"));
                }
                TypeKind::Matrix {
                    column,
                    columns: operand(inst, 2)?,
                }
            }
            Op::TypeImage => {
                let sampled = operand(inst, 1)?;
                let dim = operand(inst, 2)?;
                let dim = Dim::from_u32(dim)
                    .ok_or_else(|| corrupt(inst, id, format!("unknown image dimension {dim}")))?;
                let mut flags = ImageFlags::empty();
                flags.set(ImageFlags::DEPTH, operand(inst, 3)? == 1);
                flags.set(ImageFlags::ARRAYED, operand(inst, 4)? != 0);
                flags.set(ImageFlags::MULTISAMPLED, operand(inst, 5)? != 0);
                flags.set(ImageFlags::STORAGE, operand(inst, 6)? == 2);
                TypeKind::Image {
                    sampled,
                    dim,
                    flags,
                }
            }
            Op::TypeSampler => TypeKind::Sampler,
            Op::TypeSampledImage => {
                let image = operand(inst, 1)?;
                self.require_type(inst, image)?;
                TypeKind::SampledImage { image }
            }
            Op::TypeArray => {
                let element = operand(inst, 1)?;
                self.require_type(inst, element)?;
                let length_id = operand(inst, 2)?;
                TypeKind::Array {
                    element,
                    length: self.constant_u32(length_id),
                }
            }
            Op::TypeRuntimeArray => {
                let element = operand(inst, 1)?;
                self.require_type(inst, element)?;
                TypeKind::Array {
                    element,
                    length: None,
                }
            }
            Op::TypeStruct => {
                let members = inst.operands[1..].to_vec();
                for (index, &member_ty) in members.iter().enumerate() {
                    self.require_type(inst, member_ty)?;
                    self.members
                        .entry((id, index as u32))
                        .or_default()
                        .ty = member_ty;
                }
                TypeKind::Struct { members }
            }
            Op::TypePointer => {
                let storage = operand(inst, 1)?;
                let storage = StorageClass::from_u32(storage).ok_or_else(|| {
                    corrupt(inst, id, format!("unknown storage class {storage}"))
                })?;
                TypeKind::Pointer {
                    storage,
                    pointee: operand(inst, 2)?,
                }
            }
            Op::TypeFunction => TypeKind::Function {
                result: operand(inst, 1)?,
                parameters: inst.operands[2..].to_vec(),
            },
            _ => return Ok(()),
        };
        if self.types.insert(id, kind).is_none() {
            self.type_order.push(id);
        }
        Ok(())
    }

    fn record_decoration(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let target = operand(inst, 0)?;
        let decoration = operand(inst, 1)?;
        let value = inst.operand(2);
        let Some(decoration) = Decoration::from_u32(decoration) else {
            return Ok(());
        };
        match decoration {
            Decoration::Block | Decoration::BufferBlock => {
                self.block_types.insert(target);
            }
            Decoration::ArrayStride => {
                self.array_strides.insert(target, operand(inst, 2)?);
            }
            Decoration::BuiltIn => {
                let raw = operand(inst, 2)?;
                let builtin = BuiltIn::from_u32(raw)
                    .ok_or_else(|| corrupt(inst, target, format!("unknown builtin {raw}")))?;
                self.variables.entry(target).or_default().builtin = Some(builtin);
            }
            Decoration::Location => {
                self.variables.entry(target).or_default().location = value;
            }
            Decoration::Binding => {
                self.variables.entry(target).or_default().binding = value;
            }
            Decoration::DescriptorSet => {
                self.variables.entry(target).or_default().descriptor_set = value;
            }
            Decoration::Offset => {
                self.variables.entry(target).or_default().offset = value;
            }
            _ => {}
        }
        // Interface decorations on an existing variable must agree with its storage class.
        if let Some(var) = self.variable(target) {
            check_decoration_storage(inst, target, var)?;
        }
        Ok(())
    }

    fn record_member_decoration(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ty = operand(inst, 0)?;
        let index = operand(inst, 1)?;
        let decoration = operand(inst, 2)?;
        if self
            .types
            .get(&ty)
            .is_some_and(|kind| !kind.is_struct())
        {
            return Err(corrupt(inst, ty, "member decoration on a non-struct type"));
        }
        let member = self.members.entry((ty, index)).or_default();
        match Decoration::from_u32(decoration) {
            Some(Decoration::BuiltIn) => {
                let raw = operand(inst, 3)?;
                member.builtin = Some(
                    BuiltIn::from_u32(raw)
                        .ok_or_else(|| corrupt(inst, ty, format!("unknown builtin {raw}")))?,
                );
            }
            Some(Decoration::Offset) => member.offset = Some(operand(inst, 3)?),
            _ => {}
        }
        Ok(())
    }

    fn record_variable(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let pointer_ty = operand(inst, 0)?;
        let id = operand(inst, 1)?;
        self.check_id(inst, id)?;
        let storage = operand(inst, 2)?;
        let storage = StorageClass::from_u32(storage)
            .ok_or_else(|| corrupt(inst, id, format!("unknown storage class {storage}")))?;
        let pointee = match self.require_type(inst, pointer_ty)? {
            TypeKind::Pointer { pointee, .. } => *pointee,
            _ => {
                return Err(corrupt(
                    inst,
                    id,
                    format!("variable type %{pointer_ty} is not a pointer"),
                ))
            }
        };
        let var = self.variables.entry(id).or_default();
        var.ty = pointee;
        var.storage = Some(storage);
        var.local = storage == StorageClass::Function;
        let var = var.clone();
        check_decoration_storage(inst, id, &var)?;
        self.value_types.insert(id, pointer_ty);
        Ok(())
    }
}

fn check_decoration_storage(
    inst: &Instruction,
    id: Id,
    var: &Variable,
) -> Result<(), TranslateError> {
    let Some(storage) = var.storage else {
        return Ok(());
    };
    let is_interface = matches!(storage, StorageClass::Input | StorageClass::Output);
    if is_interface && (var.binding.is_some() || var.descriptor_set.is_some()) {
        return Err(corrupt(
            inst,
            id,
            format!("descriptor binding on a {storage:?} variable"),
        ));
    }
    if storage == StorageClass::Function && (var.builtin.is_some() || var.location.is_some()) {
        return Err(corrupt(inst, id, "interface decoration on a function-local variable"));
    }
    Ok(())
}
