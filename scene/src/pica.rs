//! Fixed-function GPU plumbing: register command streams, texture pixel
//! formats and vertex attribute packing.

pub mod codec;
pub mod commands;
pub mod vertex;

pub use codec::{
    bits_per_pixel, buffer_length, mip_chain_length, CodecError, PicaCodec, TextureCodec,
    TextureFormat,
};
pub use commands::{parameter_index, Command, CommandReader, CommandWriter, PicaRegister};
pub use vertex::{
    decode_vertices, encode_vertices, quantize_weight, skinned_attributes, vertex_stride,
    Attribute, AttributeFormat, AttributeName, WEIGHT_SCALE,
};
