//! Checkpoint reading and state-dict application
//!
//! Three on-disk encodings are accepted and all decode to a [`StateDict`]:
//! a Python pickle of a dict mapping names to numeric arrays (`.pkl`), a
//! torch-saved state dict (`.pt` / `.pth`), and safetensors for everything
//! else.

use crate::module::Module;
use candle_core::{DType, Device, Tensor};
use serde_pickle::{DeOptions, HashableValue, Value};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tap_types::{Result, TapError};
use tracing::{debug, info, warn};

/// Parameter path to tensor
pub type StateDict = HashMap<String, Tensor>;

/// Checkpoint encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// Pickled dict of raw numeric arrays
    Pickle,
    /// Torch zip archive holding a state dict
    Torch,
    /// Native tensor container
    SafeTensors,
}

impl CheckpointFormat {
    /// Select the format from the file suffix: `.pkl` is pickle, `.pt` and
    /// `.pth` are torch archives, anything else is read as safetensors.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("pkl") => CheckpointFormat::Pickle,
            Some("pt") | Some("pth") => CheckpointFormat::Torch,
            _ => CheckpointFormat::SafeTensors,
        }
    }
}

/// Outcome of applying a state dict
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Keys assigned into the module
    pub loaded: usize,
    /// Module parameters absent from the checkpoint
    pub missing_keys: Vec<String>,
    /// Checkpoint entries with no matching parameter
    pub unexpected_keys: Vec<String>,
}

/// Load a weights file into `module`.
///
/// A missing (or empty) path is a no-op and the module keeps its declared
/// initial values.
pub fn load_weights(module: &mut Module, path: Option<&Path>, strict: bool) -> Result<LoadReport> {
    let path = match path {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => {
            debug!("No checkpoint given, keeping initial parameters");
            return Ok(LoadReport::default());
        }
    };

    let state_dict = read_checkpoint(path)?;
    let report = load_state_dict(module, state_dict, strict)?;
    info!(
        "Loaded {} tensors from {} ({} missing, {} unexpected)",
        report.loaded,
        path.display(),
        report.missing_keys.len(),
        report.unexpected_keys.len()
    );
    Ok(report)
}

/// Decode a checkpoint file into host tensors
pub fn read_checkpoint(path: &Path) -> Result<StateDict> {
    let format = CheckpointFormat::from_path(path);
    debug!("Reading {:?} checkpoint: {}", format, path.display());

    match format {
        CheckpointFormat::Pickle => read_pickle(path),
        CheckpointFormat::Torch => candle_core::pickle::read_all(path)
            .map(|tensors| tensors.into_iter().collect())
            .map_err(|e| {
                TapError::load(format!(
                    "Failed to read torch checkpoint {}: {}",
                    path.display(),
                    e
                ))
            }),
        CheckpointFormat::SafeTensors => candle_core::safetensors::load(path, &Device::Cpu)
            .map_err(|e| {
                TapError::load(format!(
                    "Failed to read safetensors {}: {}",
                    path.display(),
                    e
                ))
            }),
    }
}

/// Assign `state_dict` into the module's parameters.
///
/// Keys and shapes are validated before anything is written, so a failed
/// load leaves the module untouched. Under `strict`, both missing and
/// unexpected keys are fatal; otherwise they are skipped and reported.
/// A shape mismatch on a present key is always fatal.
pub fn load_state_dict(
    module: &mut Module,
    mut state_dict: StateDict,
    strict: bool,
) -> Result<LoadReport> {
    let expected: BTreeSet<String> = module
        .named_parameters()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    let provided: BTreeSet<String> = state_dict.keys().cloned().collect();

    let missing_keys: Vec<String> = expected.difference(&provided).cloned().collect();
    let unexpected_keys: Vec<String> = provided.difference(&expected).cloned().collect();

    if strict && (!missing_keys.is_empty() || !unexpected_keys.is_empty()) {
        return Err(TapError::load(format!(
            "state dict does not match model: missing keys {:?}, unexpected keys {:?}",
            missing_keys, unexpected_keys
        )));
    }

    for name in expected.intersection(&provided) {
        let (Some(param), Some(tensor)) = (module.parameter(name), state_dict.get(name)) else {
            continue;
        };
        if param.dims() != tensor.dims() {
            return Err(TapError::load(format!(
                "size mismatch for {}: checkpoint has {:?}, model expects {:?}",
                name,
                tensor.dims(),
                param.dims()
            )));
        }
    }

    if !missing_keys.is_empty() {
        warn!("Missing keys in checkpoint: {:?}", missing_keys);
    }
    if !unexpected_keys.is_empty() {
        warn!("Unexpected keys in checkpoint: {:?}", unexpected_keys);
    }

    let mut loaded = 0;
    for name in expected.intersection(&provided) {
        if let (Some(param), Some(tensor)) = (module.parameter_mut(name), state_dict.remove(name)) {
            param
                .set(tensor)
                .map_err(|e| TapError::load(format!("Failed to load {}: {}", name, e)))?;
            loaded += 1;
        }
    }

    Ok(LoadReport {
        loaded,
        missing_keys,
        unexpected_keys,
    })
}

fn read_pickle(path: &Path) -> Result<StateDict> {
    let file = File::open(path)
        .map_err(|e| TapError::load(format!("Failed to open {}: {}", path.display(), e)))?;
    // numpy memoizes its dtype objects; later references to them decode as None
    let options = DeOptions::new().replace_unresolved_globals();
    let value = serde_pickle::value_from_reader(BufReader::new(file), options)
        .map_err(|e| TapError::load(format!("Failed to unpickle {}: {}", path.display(), e)))?;

    let Value::Dict(entries) = value else {
        return Err(TapError::load(format!(
            "{}: expected a dict at the top level",
            path.display()
        )));
    };

    let mut state_dict = StateDict::with_capacity(entries.len());
    for (key, value) in entries {
        let name = match key {
            HashableValue::String(name) => name,
            other => {
                return Err(TapError::load(format!(
                    "{}: non-string key {:?}",
                    path.display(),
                    other
                )))
            }
        };
        let tensor = value_to_tensor(&value)
            .map_err(|e| TapError::load(format!("{}: entry {}: {}", path.display(), name, e)))?;
        state_dict.insert(name, tensor);
    }
    Ok(state_dict)
}

/// Coerce one pickled value into an f32 host tensor.
///
/// Accepted forms: a numpy ndarray, a number (0-d tensor), nested
/// lists/tuples of numbers (shape inferred, must be rectangular), or a dict
/// with `shape` and a flat `data` list.
fn value_to_tensor(value: &Value) -> std::result::Result<Tensor, String> {
    let (shape, data) = match value {
        Value::Tuple(state) if is_ndarray_state(state) => return ndarray_to_tensor(state),
        Value::Dict(fields) => shaped_array(fields)?,
        _ => {
            let mut shape = Vec::new();
            let mut data = Vec::new();
            flatten(value, 0, &mut shape, &mut data)?;
            (shape, data)
        }
    };
    Tensor::from_vec(data, shape, &Device::Cpu).map_err(|e| e.to_string())
}

/// A pickled ndarray unpickles to its `__setstate__` tuple:
/// `(version, shape, dtype, fortran_order, raw_bytes)`.
fn is_ndarray_state(state: &[Value]) -> bool {
    matches!(
        state,
        [Value::I64(_), Value::Tuple(_) | Value::List(_), _, Value::Bool(_), Value::Bytes(_)]
    )
}

/// Decode a float ndarray from its raw buffer.
///
/// The dtype object loses its type code on unpickling, so the element type
/// is taken from the buffer width (2, 4 or 8 bytes per element: f16, f32,
/// f64) and the byte order from the dtype state when it survives.
fn ndarray_to_tensor(state: &[Value]) -> std::result::Result<Tensor, String> {
    let [_, Value::Tuple(dims) | Value::List(dims), dtype, Value::Bool(fortran), Value::Bytes(raw)] =
        state
    else {
        return Err("malformed ndarray state".to_string());
    };
    let shape = dims
        .iter()
        .map(|dim| match dim {
            Value::I64(n) if *n >= 0 => Ok(*n as usize),
            other => Err(format!("invalid ndarray dimension {:?}", other)),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let count: usize = shape.iter().product();
    if count == 0 {
        return Tensor::zeros(shape, DType::F32, &Device::Cpu).map_err(|e| e.to_string());
    }
    if raw.len() % count != 0 {
        return Err(format!(
            "ndarray buffer of {} bytes does not divide into {} elements",
            raw.len(),
            count
        ));
    }
    let width = raw.len() / count;
    let elem_dtype = match width {
        2 => DType::F16,
        4 => DType::F32,
        8 => DType::F64,
        other => return Err(format!("unsupported ndarray element width {}", other)),
    };

    let mut bytes = raw.clone();
    if ndarray_is_big_endian(dtype) {
        for elem in bytes.chunks_exact_mut(width) {
            elem.reverse();
        }
    }

    // column-major buffers are read with reversed dims, then transposed back
    let tensor = if *fortran && shape.len() > 1 {
        let reversed: Vec<usize> = shape.iter().rev().copied().collect();
        let axes: Vec<usize> = (0..shape.len()).rev().collect();
        Tensor::from_raw_buffer(&bytes, elem_dtype, &reversed, &Device::Cpu)
            .and_then(|t| t.permute(axes))
            .and_then(|t| t.contiguous())
    } else {
        Tensor::from_raw_buffer(&bytes, elem_dtype, &shape, &Device::Cpu)
    };
    tensor
        .and_then(|t| t.to_dtype(DType::F32))
        .map_err(|e| e.to_string())
}

fn ndarray_is_big_endian(dtype: &Value) -> bool {
    let order = match dtype {
        Value::Tuple(fields) => fields.get(1),
        _ => None,
    };
    match order {
        Some(Value::String(order)) => order == ">",
        Some(Value::Bytes(order)) => order.as_slice() == b">",
        _ => cfg!(target_endian = "big"),
    }
}

fn shaped_array(
    fields: &std::collections::BTreeMap<HashableValue, Value>,
) -> std::result::Result<(Vec<usize>, Vec<f32>), String> {
    let field = |name: &str| {
        fields
            .get(&HashableValue::String(name.to_string()))
            .ok_or_else(|| format!("array dict without '{}'", name))
    };

    let shape = match field("shape")? {
        Value::List(dims) | Value::Tuple(dims) => dims
            .iter()
            .map(|dim| match dim {
                Value::I64(n) if *n >= 0 => Ok(*n as usize),
                other => Err(format!("invalid dimension {:?}", other)),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?,
        other => return Err(format!("invalid shape {:?}", other)),
    };

    let data = match field("data")? {
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(scalar)
            .collect::<std::result::Result<Vec<_>, _>>()?,
        other => return Err(format!("invalid data {:?}", other)),
    };

    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(format!(
            "shape {:?} needs {} elements, data has {}",
            shape,
            expected,
            data.len()
        ));
    }
    Ok((shape, data))
}

fn flatten(
    value: &Value,
    depth: usize,
    shape: &mut Vec<usize>,
    data: &mut Vec<f32>,
) -> std::result::Result<(), String> {
    match value {
        Value::List(items) | Value::Tuple(items) => {
            match shape.get(depth) {
                Some(&len) if len != items.len() => {
                    return Err(format!(
                        "ragged array: dimension {} has lengths {} and {}",
                        depth,
                        len,
                        items.len()
                    ))
                }
                Some(_) => {}
                None if shape.len() == depth && data.is_empty() => shape.push(items.len()),
                None => return Err(format!("ragged array: unexpected nesting at depth {}", depth)),
            }
            for item in items {
                flatten(item, depth + 1, shape, data)?;
            }
            Ok(())
        }
        _ => {
            if depth != shape.len() {
                return Err(format!("ragged array: scalar at depth {}", depth));
            }
            data.push(scalar(value)?);
            Ok(())
        }
    }
}

fn scalar(value: &Value) -> std::result::Result<f32, String> {
    match value {
        Value::F64(x) => Ok(*x as f32),
        Value::I64(x) => Ok(*x as f32),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(format!("non-numeric value {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: Vec<Value>) -> Value {
        Value::List(items)
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            CheckpointFormat::from_path(Path::new("weights/tap_vit_b.pkl")),
            CheckpointFormat::Pickle
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("model.safetensors")),
            CheckpointFormat::SafeTensors
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("model.pth")),
            CheckpointFormat::Torch
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("model.PT")),
            CheckpointFormat::Torch
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("no_extension")),
            CheckpointFormat::SafeTensors
        );
    }

    #[test]
    fn test_nested_lists_infer_shape() {
        let value = list(vec![
            list(vec![Value::F64(1.0), Value::F64(2.0), Value::F64(3.0)]),
            list(vec![Value::I64(4), Value::I64(5), Value::I64(6)]),
        ]);
        let tensor = value_to_tensor(&value).unwrap();
        assert_eq!(tensor.dims(), &[2, 3]);
        assert_eq!(
            tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    fn test_scalar_is_zero_dim() {
        let tensor = value_to_tensor(&Value::F64(0.5)).unwrap();
        assert_eq!(tensor.rank(), 0);
        assert_eq!(tensor.to_scalar::<f32>().unwrap(), 0.5);
    }

    #[test]
    fn test_ragged_lists_rejected() {
        let value = list(vec![
            list(vec![Value::F64(1.0), Value::F64(2.0)]),
            list(vec![Value::F64(3.0)]),
        ]);
        assert!(value_to_tensor(&value).is_err());

        let value = list(vec![Value::F64(1.0), list(vec![Value::F64(2.0)])]);
        assert!(value_to_tensor(&value).is_err());
    }

    #[test]
    fn test_shaped_dict() {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert(
            HashableValue::String("shape".to_string()),
            list(vec![Value::I64(2), Value::I64(2)]),
        );
        fields.insert(
            HashableValue::String("data".to_string()),
            list(vec![
                Value::F64(1.0),
                Value::F64(2.0),
                Value::F64(3.0),
                Value::F64(4.0),
            ]),
        );
        let tensor = value_to_tensor(&Value::Dict(fields.clone())).unwrap();
        assert_eq!(tensor.dims(), &[2, 2]);

        fields.insert(
            HashableValue::String("shape".to_string()),
            list(vec![Value::I64(3)]),
        );
        assert!(value_to_tensor(&Value::Dict(fields)).is_err());
    }

    /// Opcode stream numpy emits for one ndarray; `dtype_memo` selects between
    /// the first (memoized) dtype and a later back-reference to it.
    fn ndarray_ops(out: &mut Vec<u8>, dims: &[u8], fortran: bool, raw: &[u8], dtype_memo: bool) {
        out.extend_from_slice(b"cnumpy.core.multiarray\n_reconstruct\n");
        out.extend_from_slice(b"cnumpy\nndarray\n");
        out.extend_from_slice(b"K\x00\x85C\x01b\x87R");
        out.extend_from_slice(b"(K\x01(");
        for dim in dims {
            out.extend_from_slice(&[b'K', *dim]);
        }
        out.push(b't');
        if dtype_memo {
            out.extend_from_slice(b"cnumpy\ndtype\nX\x02\x00\x00\x00f4\x89\x88\x87Rq\x00");
            out.extend_from_slice(b"(K\x03X\x01\x00\x00\x00<NNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00tb");
        } else {
            out.extend_from_slice(b"h\x00");
        }
        out.push(if fortran { 0x88 } else { 0x89 });
        out.push(b'B');
        out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        out.extend_from_slice(raw);
        out.extend_from_slice(b"tb");
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_numpy_arrays_decode() {
        let mut bytes = b"\x80\x03}(".to_vec();
        bytes.extend_from_slice(b"X\x01\x00\x00\x00w");
        ndarray_ops(&mut bytes, &[2, 3], false, &f32_bytes(&[1., 2., 3., 4., 5., 6.]), true);
        bytes.extend_from_slice(b"X\x01\x00\x00\x00f");
        ndarray_ops(&mut bytes, &[2, 3], true, &f32_bytes(&[1., 4., 2., 5., 3., 6.]), false);
        bytes.extend_from_slice(b"X\x01\x00\x00\x00b");
        ndarray_ops(&mut bytes, &[3], false, &f32_bytes(&[0.5, -1.0, 2.0]), false);
        bytes.extend_from_slice(b"u.");

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("weights.pkl");
        std::fs::write(&path, bytes).unwrap();
        let state_dict = read_checkpoint(&path).unwrap();

        let w = &state_dict["w"];
        assert_eq!(w.dims(), &[2, 3]);
        assert_eq!(
            w.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
        assert_eq!(
            state_dict["f"].flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
        assert_eq!(
            state_dict["b"].to_vec1::<f32>().unwrap(),
            vec![0.5, -1.0, 2.0]
        );
    }

    #[test]
    fn test_ndarray_width_must_divide() {
        let state = vec![
            Value::I64(1),
            Value::Tuple(vec![Value::I64(3)]),
            Value::None,
            Value::Bool(false),
            Value::Bytes(vec![0; 10]),
        ];
        let err = value_to_tensor(&Value::Tuple(state)).unwrap_err();
        assert!(err.contains("does not divide"));
    }

    #[test]
    fn test_big_endian_ndarray() {
        let raw: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_be_bytes()).collect();
        let dtype = Value::Tuple(vec![Value::I64(3), Value::String(">".to_string())]);
        let state = vec![
            Value::I64(1),
            Value::Tuple(vec![Value::I64(2)]),
            dtype,
            Value::Bool(false),
            Value::Bytes(raw),
        ];
        let tensor = value_to_tensor(&Value::Tuple(state)).unwrap();
        assert_eq!(tensor.to_vec1::<f32>().unwrap(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_torch_archive_is_not_parsed_as_safetensors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model.pth");
        std::fs::write(&path, b"not a zip archive").unwrap();
        let err = read_checkpoint(&path).unwrap_err();
        assert!(err.is_load_error());
        assert!(err.to_string().contains("torch checkpoint"));
    }

    #[test]
    fn test_non_numeric_rejected() {
        assert!(value_to_tensor(&Value::String("nope".to_string())).is_err());
    }
}
