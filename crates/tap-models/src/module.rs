//! Module tree
//!
//! A model is a tree of [`Module`] nodes. Each node exclusively owns its
//! children and parameters; parameters are addressed globally by dotted path
//! from the root (`image_encoder.blocks.0.attn.qkv.weight`).

use crate::param::Param;
use candle_core::{DType, Device};
use tap_types::Result;

/// Variant tag of a module node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Any component that is not a batch-normalization leaf
    Generic,
    /// Batch normalization with statistics synchronized across workers
    SyncNorm,
    /// Plain batch normalization
    PlainNorm,
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Generic => "generic",
            NodeKind::SyncNorm => "normalization-sync",
            NodeKind::PlainNorm => "normalization-plain",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A node in the model tree
#[derive(Debug, Clone)]
pub enum Module {
    Block(Block),
    SyncBatchNorm(BatchNorm),
    BatchNorm(BatchNorm),
}

/// Generic component: own parameters plus named children, in insertion order
#[derive(Debug, Clone)]
pub struct Block {
    kind: String,
    params: Vec<(String, Param)>,
    children: Vec<(String, Module)>,
}

/// Batch-normalization configuration and state
#[derive(Debug, Clone)]
pub struct BatchNorm {
    num_features: usize,
    eps: f64,
    momentum: Option<f64>,
    affine: bool,
    weight: Option<Param>,
    bias: Option<Param>,
    running_mean: Param,
    running_var: Param,
}

impl Block {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Component kind, e.g. `"attention"` or `"image_encoder"`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn with_param(mut self, name: impl Into<String>, param: Param) -> Self {
        self.insert_param(name, param);
        self
    }

    pub fn with_child(mut self, name: impl Into<String>, child: impl Into<Module>) -> Self {
        self.insert_child(name, child);
        self
    }

    /// Insert or replace a parameter
    pub fn insert_param(&mut self, name: impl Into<String>, param: Param) {
        let name = name.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = param,
            None => self.params.push((name, param)),
        }
    }

    /// Insert or replace a child, keeping its position when replaced
    pub fn insert_child(&mut self, name: impl Into<String>, child: impl Into<Module>) {
        let name = name.into();
        let child = child.into();
        match self.children.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = child,
            None => self.children.push((name, child)),
        }
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.params
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    pub fn child(&self, name: &str) -> Option<&Module> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.children
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.params.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Module)> {
        self.children.iter().map(|(n, m)| (n.as_str(), m))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.children.is_empty()
    }

    /// Rebuild this block with every child passed through `f`.
    ///
    /// The result has the same kind, parameters and child names in the same
    /// order; only the children themselves are replaced.
    ///
    /// The block's own `Param`s are cloned, so both trees share their tensor
    /// storage. That holds only while parameters are never written in place;
    /// in-place writes would require `Param::deep_copy` here.
    pub fn try_map_children<F>(&self, mut f: F) -> Result<Block>
    where
        F: FnMut(&Module) -> Result<Module>,
    {
        let children = self
            .children
            .iter()
            .map(|(name, child)| Ok((name.clone(), f(child)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Block {
            kind: self.kind.clone(),
            params: self.params.clone(),
            children,
        })
    }
}

impl BatchNorm {
    pub const DEFAULT_EPS: f64 = 1e-5;
    pub const DEFAULT_MOMENTUM: f64 = 0.1;

    /// Affine batch norm over `num_features` channels with default eps/momentum
    pub fn new(num_features: usize) -> Self {
        Self::with_config(
            num_features,
            Self::DEFAULT_EPS,
            Some(Self::DEFAULT_MOMENTUM),
            true,
        )
    }

    pub fn with_config(num_features: usize, eps: f64, momentum: Option<f64>, affine: bool) -> Self {
        let (weight, bias) = if affine {
            (
                Some(Param::ones(&[num_features])),
                Some(Param::zeros(&[num_features])),
            )
        } else {
            (None, None)
        };
        Self {
            num_features,
            eps,
            momentum,
            affine,
            weight,
            bias,
            running_mean: Param::zeros(&[num_features]),
            running_var: Param::ones(&[num_features]),
        }
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn momentum(&self) -> Option<f64> {
        self.momentum
    }

    pub fn affine(&self) -> bool {
        self.affine
    }

    pub fn weight(&self) -> Option<&Param> {
        self.weight.as_ref()
    }

    pub fn bias(&self) -> Option<&Param> {
        self.bias.as_ref()
    }

    pub fn running_mean(&self) -> &Param {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Param {
        &self.running_var
    }

    /// Same configuration, every parameter copied into fresh storage
    pub fn detached_copy(&self) -> Result<Self> {
        let weight = self.weight.as_ref().map(Param::deep_copy).transpose()?;
        let bias = self.bias.as_ref().map(Param::deep_copy).transpose()?;
        Ok(Self {
            num_features: self.num_features,
            eps: self.eps,
            momentum: self.momentum,
            affine: self.affine,
            weight,
            bias,
            running_mean: self.running_mean.deep_copy()?,
            running_var: self.running_var.deep_copy()?,
        })
    }

    /// Parameters and running statistics in state-dict order
    pub fn params(&self) -> Vec<(&'static str, &Param)> {
        let mut out = Vec::with_capacity(4);
        if let Some(weight) = &self.weight {
            out.push(("weight", weight));
        }
        if let Some(bias) = &self.bias {
            out.push(("bias", bias));
        }
        out.push(("running_mean", &self.running_mean));
        out.push(("running_var", &self.running_var));
        out
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut Param> {
        match name {
            "weight" => self.weight.as_mut(),
            "bias" => self.bias.as_mut(),
            "running_mean" => Some(&mut self.running_mean),
            "running_var" => Some(&mut self.running_var),
            _ => None,
        }
    }

    fn params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        let mut out = Vec::with_capacity(4);
        if let Some(weight) = self.weight.as_mut() {
            out.push(("weight", weight));
        }
        if let Some(bias) = self.bias.as_mut() {
            out.push(("bias", bias));
        }
        out.push(("running_mean", &mut self.running_mean));
        out.push(("running_var", &mut self.running_var));
        out
    }
}

impl From<Block> for Module {
    fn from(block: Block) -> Self {
        Module::Block(block)
    }
}

impl Module {
    pub fn kind(&self) -> NodeKind {
        match self {
            Module::Block(_) => NodeKind::Generic,
            Module::SyncBatchNorm(_) => NodeKind::SyncNorm,
            Module::BatchNorm(_) => NodeKind::PlainNorm,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Module::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_batch_norm(&self) -> Option<&BatchNorm> {
        match self {
            Module::SyncBatchNorm(bn) | Module::BatchNorm(bn) => Some(bn),
            Module::Block(_) => None,
        }
    }

    /// Direct child by name (batch-norm leaves have none)
    pub fn child(&self, name: &str) -> Option<&Module> {
        self.as_block().and_then(|block| block.child(name))
    }

    /// Every parameter in the tree with its dotted path, depth first
    pub fn named_parameters(&self) -> Vec<(String, &Param)> {
        let mut out = Vec::new();
        self.collect_params("", &mut out);
        out
    }

    fn collect_params<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Param)>) {
        match self {
            Module::Block(block) => {
                for (name, param) in block.params() {
                    out.push((join_path(prefix, name), param));
                }
                for (name, child) in block.children() {
                    child.collect_params(&join_path(prefix, name), out);
                }
            }
            Module::SyncBatchNorm(bn) | Module::BatchNorm(bn) => {
                for (name, param) in bn.params() {
                    out.push((join_path(prefix, name), param));
                }
            }
        }
    }

    /// Every node with its dotted path; the root has the empty path
    pub fn named_modules(&self) -> Vec<(String, &Module)> {
        let mut out = Vec::new();
        self.collect_modules(String::new(), &mut out);
        out
    }

    fn collect_modules<'a>(&'a self, path: String, out: &mut Vec<(String, &'a Module)>) {
        if let Module::Block(block) = self {
            out.push((path.clone(), self));
            for (name, child) in block.children() {
                child.collect_modules(join_path(&path, name), out);
            }
        } else {
            out.push((path, self));
        }
    }

    /// Number of nodes of the given kind, including `self`
    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.named_modules()
            .into_iter()
            .filter(|(_, m)| m.kind() == kind)
            .count()
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> usize {
        self.named_parameters()
            .iter()
            .map(|(_, p)| p.elem_count())
            .sum()
    }

    pub fn parameter(&self, path: &str) -> Option<&Param> {
        match self {
            Module::Block(block) => match block.param(path) {
                Some(param) => Some(param),
                None => {
                    let (head, tail) = path.split_once('.')?;
                    block.child(head)?.parameter(tail)
                }
            },
            Module::SyncBatchNorm(bn) | Module::BatchNorm(bn) => bn
                .params()
                .into_iter()
                .find(|(name, _)| *name == path)
                .map(|(_, p)| p),
        }
    }

    pub fn parameter_mut(&mut self, path: &str) -> Option<&mut Param> {
        match self {
            Module::Block(block) => {
                if block.param(path).is_some() {
                    return block.param_mut(path);
                }
                let (head, tail) = path.split_once('.')?;
                block.child_mut(head)?.parameter_mut(tail)
            }
            Module::SyncBatchNorm(bn) | Module::BatchNorm(bn) => bn.param_mut(path),
        }
    }

    /// Apply `f` to every parameter in the tree
    pub fn try_for_each_param_mut<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Param) -> Result<()>,
    {
        match self {
            Module::Block(block) => {
                for (_, param) in block.params.iter_mut() {
                    f(param)?;
                }
                for (_, child) in block.children.iter_mut() {
                    child.try_for_each_param_mut(f)?;
                }
            }
            Module::SyncBatchNorm(bn) | Module::BatchNorm(bn) => {
                for (_, param) in bn.params_mut() {
                    f(param)?;
                }
            }
        }
        Ok(())
    }

    pub fn to_device(&mut self, device: &Device) -> Result<()> {
        self.try_for_each_param_mut(&mut |param: &mut Param| param.to_device(device))
    }

    pub fn to_dtype(&mut self, dtype: DType) -> Result<()> {
        self.try_for_each_param_mut(&mut |param: &mut Param| param.to_dtype(dtype))
    }

    /// Allocate every deferred parameter from its initializer
    pub fn materialize(&mut self) -> Result<()> {
        self.try_for_each_param_mut(&mut |param: &mut Param| param.materialize())
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Tensor;

    fn sample() -> Module {
        Block::new("root")
            .with_param("scale", Param::ones(&[1]))
            .with_child(
                "stem",
                Block::new("conv")
                    .with_param("weight", Param::zeros(&[4, 3, 1, 1]))
                    .with_child("norm", Module::SyncBatchNorm(BatchNorm::new(4))),
            )
            .with_child("head", Block::new("linear").with_param("weight", Param::zeros(&[2, 4])))
            .into()
    }

    #[test]
    fn dotted_parameter_paths() {
        let module = sample();
        let names: Vec<String> = module
            .named_parameters()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            names,
            vec![
                "scale",
                "stem.weight",
                "stem.norm.weight",
                "stem.norm.bias",
                "stem.norm.running_mean",
                "stem.norm.running_var",
                "head.weight",
            ]
        );
    }

    #[test]
    fn parameter_lookup_by_path() {
        let mut module = sample();
        assert_eq!(module.parameter("stem.norm.running_var").unwrap().dims(), &[4]);
        assert!(module.parameter("stem.missing").is_none());
        assert!(module.parameter("head.weight.extra").is_none());
        assert!(module.parameter_mut("head.weight").is_some());
    }

    #[test]
    fn count_kinds_and_parameters() {
        let module = sample();
        assert_eq!(module.count_kind(NodeKind::SyncNorm), 1);
        assert_eq!(module.count_kind(NodeKind::PlainNorm), 0);
        assert_eq!(module.count_kind(NodeKind::Generic), 3);
        assert_eq!(module.num_parameters(), 1 + 12 + 4 * 4 + 8);
    }

    #[test]
    fn non_affine_batch_norm_has_no_scale() {
        let bn = BatchNorm::with_config(8, 1e-3, None, false);
        let names: Vec<&str> = bn.params().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["running_mean", "running_var"]);
        assert!(bn.weight().is_none());
    }

    #[test]
    fn mapped_block_shares_storage_until_set() {
        let scale = Param::from_tensor(Tensor::new(&[1f32, 2f32], &Device::Cpu).unwrap());
        let mut source: Module = Block::new("root")
            .with_param("scale", scale)
            .with_child("inner", Block::new("x"))
            .into();
        let mapped: Module = source
            .as_block()
            .unwrap()
            .try_map_children(|child| Ok(child.clone()))
            .unwrap()
            .into();

        let id = |m: &Module| m.parameter("scale").and_then(|p| p.value()).unwrap().id();
        assert_eq!(id(&source), id(&mapped));

        // assignment swaps in new storage rather than writing through the shared one
        source
            .parameter_mut("scale")
            .unwrap()
            .set(Tensor::new(&[7f32, 7f32], &Device::Cpu).unwrap())
            .unwrap();
        assert_ne!(id(&source), id(&mapped));
        assert_eq!(
            mapped.parameter("scale").unwrap().tensor().unwrap().to_vec1::<f32>().unwrap(),
            vec![1.0, 2.0]
        );
    }

    #[test]
    fn insert_child_replaces_in_place() {
        let mut block = Block::new("root")
            .with_child("a", Block::new("x"))
            .with_child("b", Block::new("y"));
        block.insert_child("a", Block::new("z"));
        let kinds: Vec<&str> = block
            .children()
            .map(|(_, m)| m.as_block().unwrap().kind())
            .collect();
        assert_eq!(kinds, vec!["z", "y"]);
    }
}
