//! Старый формат цен в пакетах: знаковое число переменной длины с основанием 128.
//!
//! Первый байт: бит `0x80` - продолжение, бит `0x40` - знак, младшие 6 бит - начало
//! модуля. Каждый следующий байт даёт 7 бит, вес первого из них 64, дальше вес
//! умножается на 128. Это не LEB128: знак и ширина первой группы отличаются.

use crate::error::DecodeError;

const CONTINUE_BIT: u8 = 0x80;
const SIGN_BIT: u8 = 0x40;

/// Декодирует одно значение с начала `buf`.
/// Возвращает (сколько байт прочитано, значение).
pub fn decode_price(buf: &[u8]) -> Result<(usize, f64), DecodeError> {
    let first = *buf.first().ok_or(DecodeError::Truncated {
        what: "legacy price",
        offset: 0,
        need: 1,
        have: 0,
    })?;

    let mut idx = 0;
    let mut weight = 64.0;
    let mut value = (first & 0x3F) as f64;

    while buf[idx] & CONTINUE_BIT != 0 {
        idx += 1;
        let byte = *buf.get(idx).ok_or(DecodeError::Truncated {
            what: "legacy price",
            offset: idx,
            need: 1,
            have: 0,
        })?;
        value += (byte & 0x7F) as f64 * weight;
        weight *= 128.0;
    }

    if first & SIGN_BIT != 0 {
        value = -value;
    }

    Ok((idx + 1, value))
}

/// Декодирует подряд идущие значения, пока не кончится буфер
pub fn decode_prices(mut buf: &[u8]) -> Result<Vec<f64>, DecodeError> {
    let mut out = Vec::new();
    while !buf.is_empty() {
        let (n, v) = decode_price(buf)?;
        out.push(v);
        buf = &buf[n..];
    }
    Ok(out)
}

/// Обратное преобразование. Дробная часть округляется от нуля.
pub fn encode_price(value: f64) -> Vec<u8> {
    let negative = value < 0.0;
    let mut rest = (value.abs() + 0.5) as u64;

    let mut first = (rest & 0x3F) as u8;
    if negative {
        first |= SIGN_BIT;
    }
    rest >>= 6;

    let mut out = vec![first];
    while rest != 0 {
        if let Some(last) = out.last_mut() {
            *last |= CONTINUE_BIT;
        }
        out.push((rest & 0x7F) as u8);
        rest >>= 7;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "AC0E504C246180FDA60EEC0EA0BC4D978C0204880F4EB7901EA9AB2F019C8E044100";

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn decodes_vendor_sample_sequentially() {
        let buf = unhex(SAMPLE);
        let mut offset = 0;
        let mut got = Vec::new();
        while offset < buf.len() {
            let (n, v) = decode_price(&buf[offset..]).unwrap();
            got.push((n, v));
            offset += n;
        }

        assert_eq!(got[0], (2, 940.0));
        assert_eq!(got[1], (1, -16.0));
        assert_eq!(got[2], (1, -12.0));
        assert_eq!(got[5], (4, 14999360.0));
        assert_eq!(got.len(), 18);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn decode_prices_matches_step_by_step() {
        let buf = unhex(SAMPLE);
        let all = decode_prices(&buf).unwrap();
        assert_eq!(&all[..3], &[940.0, -16.0, -12.0]);
        assert_eq!(all[5], 14999360.0);
        assert_eq!(all[17], 0.0);
    }

    #[test]
    fn truncated_continuation_is_an_error() {
        // бит продолжения есть, а следующего байта нет
        let err = decode_price(&[0xAC]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { offset: 1, .. }));
        assert!(decode_price(&[]).is_err());
    }

    #[test]
    fn encoder_reproduces_vendor_bytes() {
        let buf = unhex(SAMPLE);
        assert_eq!(encode_price(940.0), buf[0..2].to_vec());
        assert_eq!(encode_price(-16.0), vec![0x50]);
        assert_eq!(encode_price(14999360.0), buf[6..10].to_vec());
    }

    #[test]
    fn encode_then_decode_rounds_half_away_from_zero() {
        for v in [0.0, 1.0, 63.0, 64.0, -64.0, 8191.0, 1_000_000.0, -123_456_789.0] {
            let bytes = encode_price(v);
            let (n, back) = decode_price(&bytes).unwrap();
            assert_eq!(n, bytes.len());
            assert_eq!(back, v);
        }
        let (_, back) = decode_price(&encode_price(2.5)).unwrap();
        assert_eq!(back, 3.0);
        let (_, back) = decode_price(&encode_price(-2.5)).unwrap();
        assert_eq!(back, -3.0);
    }
}
