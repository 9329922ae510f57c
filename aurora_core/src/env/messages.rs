//! ns3-gym bridge messages (`package ns3opengym`).
//!
//! Field numbers follow the gym interface compiled into the ns-3 scenario.
//! Space descriptions and data containers carry a `SpaceType` tag plus the
//! concrete message packed in a `google.protobuf.Any`.

use prost::Message;
use prost_types::Any;

use crate::env::spaces::{Dtype, Space};
use crate::error::{AuroraError, Result};

const TYPE_URL_PREFIX: &str = "type.googleapis.com/ns3opengym.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SpaceType {
    NoSpaceType = 0,
    Discrete = 1,
    Box = 2,
    Tuple = 3,
    Dict = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtoDtype {
    NoDtype = 0,
    Int = 1,
    Uint = 2,
    Float = 3,
    Double = 4,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DiscreteSpace {
    #[prost(int32, tag = "1")]
    pub n: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BoxSpace {
    #[prost(float, tag = "1")]
    pub low: f32,
    #[prost(float, tag = "2")]
    pub high: f32,
    #[prost(uint32, repeated, tag = "3")]
    pub shape: Vec<u32>,
    #[prost(enumeration = "ProtoDtype", tag = "4")]
    pub dtype: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SpaceDescription {
    #[prost(enumeration = "SpaceType", tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub space: Option<Any>,
    #[prost(string, tag = "3")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DiscreteDataContainer {
    #[prost(int32, tag = "1")]
    pub data: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BoxDataContainer {
    #[prost(enumeration = "ProtoDtype", tag = "1")]
    pub dtype: i32,
    #[prost(uint32, repeated, tag = "2")]
    pub shape: Vec<u32>,
    #[prost(int32, repeated, tag = "3")]
    pub int_data: Vec<i32>,
    #[prost(uint32, repeated, tag = "4")]
    pub uint_data: Vec<u32>,
    #[prost(float, repeated, tag = "5")]
    pub float_data: Vec<f32>,
    #[prost(double, repeated, tag = "6")]
    pub double_data: Vec<f64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DataContainer {
    #[prost(enumeration = "SpaceType", tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub data: Option<Any>,
    #[prost(string, tag = "3")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SimInitMsg {
    #[prost(uint64, tag = "1")]
    pub sim_process_id: u64,
    #[prost(uint64, tag = "2")]
    pub waf_shell_process_id: u64,
    #[prost(message, optional, tag = "3")]
    pub act_space: Option<SpaceDescription>,
    #[prost(message, optional, tag = "4")]
    pub obs_space: Option<SpaceDescription>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SimInitAck {
    #[prost(bool, tag = "1")]
    pub done: bool,
    #[prost(bool, tag = "2")]
    pub stop_sim_req: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EnvStateMsg {
    #[prost(message, optional, tag = "1")]
    pub obs_data: Option<DataContainer>,
    #[prost(float, tag = "2")]
    pub reward: f32,
    #[prost(bool, tag = "3")]
    pub is_game_over: bool,
    #[prost(string, tag = "4")]
    pub info: String,
    #[prost(enumeration = "env_state_msg::Reason", tag = "5")]
    pub reason: i32,
}

pub mod env_state_msg {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Reason {
        SimulationEnd = 0,
        GameOver = 1,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EnvActMsg {
    #[prost(message, optional, tag = "1")]
    pub act_data: Option<DataContainer>,
    #[prost(bool, tag = "2")]
    pub stop_sim_req: bool,
}

/// Packs `msg` the way protobuf's `Any.Pack` does for `ns3opengym.<name>`.
pub fn pack<M: Message>(name: &str, msg: &M) -> Any {
    Any {
        type_url: format!("{}{}", TYPE_URL_PREFIX, name),
        value: msg.encode_to_vec(),
    }
}

/// Unpacks an `Any` holding `ns3opengym.<name>`.
pub fn unpack<M: Message + Default>(name: &str, any: &Any) -> Result<M> {
    let packed = any.type_url.rsplit('/').next().unwrap_or_default();
    if packed.strip_prefix("ns3opengym.") != Some(name) {
        return Err(AuroraError::protocol(format!(
            "expected ns3opengym.{}, got {:?}",
            name, any.type_url
        )));
    }
    Ok(M::decode(any.value.as_slice())?)
}

fn dtype_from_proto(raw: i32) -> Dtype {
    match ProtoDtype::try_from(raw).unwrap_or(ProtoDtype::NoDtype) {
        ProtoDtype::Int => Dtype::Int32,
        ProtoDtype::Uint => Dtype::Uint32,
        ProtoDtype::Double => Dtype::Float64,
        ProtoDtype::Float | ProtoDtype::NoDtype => Dtype::Float32,
    }
}

fn dtype_to_proto(dtype: Dtype) -> ProtoDtype {
    match dtype {
        Dtype::Int32 => ProtoDtype::Int,
        Dtype::Uint32 => ProtoDtype::Uint,
        Dtype::Float32 => ProtoDtype::Float,
        Dtype::Float64 => ProtoDtype::Double,
    }
}

fn space_type(raw: i32) -> Result<SpaceType> {
    SpaceType::try_from(raw).map_err(|_| AuroraError::protocol(format!("unknown space type {}", raw)))
}

impl SpaceDescription {
    pub fn to_space(&self) -> Result<Space> {
        let any = self
            .space
            .as_ref()
            .ok_or_else(|| AuroraError::protocol("space description without a space"))?;
        match space_type(self.r#type)? {
            SpaceType::Discrete => {
                let d: DiscreteSpace = unpack("DiscreteSpace", any)?;
                if d.n <= 0 {
                    return Err(AuroraError::protocol(format!("discrete space with n = {}", d.n)));
                }
                Ok(Space::Discrete { n: d.n as usize })
            }
            SpaceType::Box => {
                let b: BoxSpace = unpack("BoxSpace", any)?;
                // Space::clip needs low <= high.
                if b.low.is_nan() || b.high.is_nan() || b.low > b.high {
                    return Err(AuroraError::protocol(format!(
                        "box bounds [{}, {}] are not an interval",
                        b.low, b.high
                    )));
                }
                let shape = b.shape.iter().map(|d| *d as usize).collect();
                Ok(Space::uniform_box(b.low, b.high, shape, dtype_from_proto(b.dtype)))
            }
            other => Err(AuroraError::UnsupportedSpace(format!("{:?} space {:?}", other, self.name))),
        }
    }

    pub fn from_space(space: &Space) -> Self {
        let (r#type, any) = match space {
            Space::Discrete { n } => (
                SpaceType::Discrete,
                pack("DiscreteSpace", &DiscreteSpace { n: *n as i32 }),
            ),
            Space::Box { low, high, shape, dtype } => (
                SpaceType::Box,
                pack(
                    "BoxSpace",
                    &BoxSpace {
                        low: low.iter().copied().fold(f32::INFINITY, f32::min),
                        high: high.iter().copied().fold(f32::NEG_INFINITY, f32::max),
                        shape: shape.iter().map(|d| *d as u32).collect(),
                        dtype: dtype_to_proto(*dtype) as i32,
                    },
                ),
            ),
        };
        Self {
            r#type: r#type as i32,
            space: Some(any),
            name: String::new(),
        }
    }
}

impl DataContainer {
    /// Float box container, the layout the PCC rate controller reads.
    pub fn float_box(values: &[f32]) -> Self {
        let data = BoxDataContainer {
            dtype: ProtoDtype::Float as i32,
            shape: vec![values.len() as u32],
            float_data: values.to_vec(),
            ..Default::default()
        };
        Self {
            r#type: SpaceType::Box as i32,
            data: Some(pack("BoxDataContainer", &data)),
            name: String::new(),
        }
    }

    pub fn discrete(value: i32) -> Self {
        Self {
            r#type: SpaceType::Discrete as i32,
            data: Some(pack("DiscreteDataContainer", &DiscreteDataContainer { data: value })),
            name: String::new(),
        }
    }

    /// Action container shaped for `space`.
    pub fn for_action(space: &Space, action: &[f32]) -> Self {
        match space {
            Space::Discrete { .. } => Self::discrete(action.first().copied().unwrap_or(0.0).round() as i32),
            Space::Box { .. } => Self::float_box(action),
        }
    }

    /// Flattens whichever typed vector is populated into `f32`s.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        let any = self
            .data
            .as_ref()
            .ok_or_else(|| AuroraError::protocol("data container without data"))?;
        match space_type(self.r#type)? {
            SpaceType::Discrete => {
                let d: DiscreteDataContainer = unpack("DiscreteDataContainer", any)?;
                Ok(vec![d.data as f32])
            }
            SpaceType::Box => {
                let b: BoxDataContainer = unpack("BoxDataContainer", any)?;
                let values = match ProtoDtype::try_from(b.dtype).unwrap_or(ProtoDtype::NoDtype) {
                    ProtoDtype::Int => b.int_data.iter().map(|v| *v as f32).collect(),
                    ProtoDtype::Uint => b.uint_data.iter().map(|v| *v as f32).collect(),
                    ProtoDtype::Double => b.double_data.iter().map(|v| *v as f32).collect(),
                    ProtoDtype::Float | ProtoDtype::NoDtype => b.float_data,
                };
                Ok(values)
            }
            other => Err(AuroraError::UnsupportedSpace(format!("{:?} data container", other))),
        }
    }
}
