//! 缓存条目编解码
//!
//! 把值包装成带版本号和时间戳的信封，按需使用gzip压缩。
//!
//! 信封格式：`{"data": <value>, "timestamp": <毫秒>, "version": "1.0"}`。
//! JSON文本不会以gzip魔数 `1f 8b` 开头，因此解码时可以直接根据前两个字节判断是否压缩。

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};

use crate::constants::ENVELOPE_VERSION;
use crate::error::DecodeError;

/// gzip魔数
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// 缓存信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// 原始值
    pub data: Value,
    /// 写入时间（Unix毫秒）
    pub timestamp: i64,
    /// 格式版本
    pub version: String,
}

impl Envelope {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
            version: ENVELOPE_VERSION.to_string(),
        }
    }
}

/// 编码结果
#[derive(Debug, Clone)]
pub struct Encoded {
    /// 最终写入缓存层的字节
    pub bytes: Vec<u8>,
    /// 压缩前信封的字节数
    pub raw_len: usize,
    /// 是否经过压缩
    pub compressed: bool,
}

/// 编码值
pub fn encode(value: &Value, compress: bool) -> Result<Encoded, DecodeError> {
    let raw = serde_json::to_vec(&Envelope::new(value.clone()))
        .map_err(|e| DecodeError::Serialize(e.to_string()))?;
    let raw_len = raw.len();

    if !compress {
        return Ok(Encoded {
            bytes: raw,
            raw_len,
            compressed: false,
        });
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(raw_len / 2), Compression::default());
    encoder
        .write_all(&raw)
        .map_err(|e| DecodeError::Serialize(format!("gzip写入失败: {}", e)))?;
    let bytes = encoder
        .finish()
        .map_err(|e| DecodeError::Serialize(format!("gzip结束失败: {}", e)))?;

    Ok(Encoded {
        bytes,
        raw_len,
        compressed: true,
    })
}

/// 解码为信封
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    if is_compressed(bytes) {
        let mut decoder = GzDecoder::new(bytes);
        let mut raw = Vec::with_capacity(bytes.len() * 2);
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| DecodeError::Decompress(e.to_string()))?;
        parse_envelope(&raw)
    } else {
        parse_envelope(bytes)
    }
}

/// 解码为原始值
pub fn decode(bytes: &[u8]) -> Result<Value, DecodeError> {
    decode_envelope(bytes).map(|envelope| envelope.data)
}

/// 字节是否为gzip压缩数据
pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

fn parse_envelope(raw: &[u8]) -> Result<Envelope, DecodeError> {
    serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))
}
