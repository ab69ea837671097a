//! 存储层模块
//!
//! 定义构建产物的数据模型及其二进制编码
//!
//! ## 模块结构
//!
//! - [`node`](node::Node) - 文档与附件节点
//! - [`index`](index::Index) - 索引根结构与链接关系
//! - [`codec`] - CBOR 编解码与索引文件读写

pub mod codec;
pub mod index;
pub mod node;

pub use codec::{decode, encode, read_index, write_index};
pub use index::{Index, IndexMetadata};
pub use node::{Attachment, Document, MediaKind, Metadata, Node, NodeKind};
