use encoding_rs::GBK;

/// Строка вендора (GBK, дополнена нулями) -> UTF-8
pub(crate) fn gbk_to_utf8(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    let (text, _) = GBK.decode_without_bom_handling(&raw[..end]);
    text.trim().to_string()
}
