//! Chinese character-variant conversion.
//!
//! Codes follow OpenCC's configuration names (`s2t`, `tw2sp`, ...). The engine is `zhconv`,
//! which converts toward a target variant; each code maps to the target it produces.

use zhconv::{zhconv, Variant};

/// Closed set of conversion codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantCode {
    S2t,
    T2s,
    S2tw,
    Tw2s,
    S2hk,
    Hk2s,
    S2twp,
    Tw2sp,
    T2tw,
    Hk2t,
    T2hk,
    Tw2t,
    T2jp,
    Jp2t,
}

impl VariantCode {
    pub const ALL: [VariantCode; 14] = [
        VariantCode::S2t,
        VariantCode::T2s,
        VariantCode::S2tw,
        VariantCode::Tw2s,
        VariantCode::S2hk,
        VariantCode::Hk2s,
        VariantCode::S2twp,
        VariantCode::Tw2sp,
        VariantCode::T2tw,
        VariantCode::Hk2t,
        VariantCode::T2hk,
        VariantCode::Tw2t,
        VariantCode::T2jp,
        VariantCode::Jp2t,
    ];

    /// Parse a code, case-insensitively, with or without a trailing `.json`.
    /// Returns None for anything outside the closed set.
    pub fn from_code(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let code = lower.strip_suffix(".json").unwrap_or(lower.as_str());
        VariantCode::ALL.into_iter().find(|c| c.as_str() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariantCode::S2t => "s2t",
            VariantCode::T2s => "t2s",
            VariantCode::S2tw => "s2tw",
            VariantCode::Tw2s => "tw2s",
            VariantCode::S2hk => "s2hk",
            VariantCode::Hk2s => "hk2s",
            VariantCode::S2twp => "s2twp",
            VariantCode::Tw2sp => "tw2sp",
            VariantCode::T2tw => "t2tw",
            VariantCode::Hk2t => "hk2t",
            VariantCode::T2hk => "t2hk",
            VariantCode::Tw2t => "tw2t",
            VariantCode::T2jp => "t2jp",
            VariantCode::Jp2t => "jp2t",
        }
    }

    /// Target variant in zhconv terms. None for the Japanese Shinjitai codes, which zhconv
    /// has no tables for. zhconv's regional targets always apply regional phrasing, so the
    /// character-only regional codes (`s2tw`, `t2tw`, `s2hk`, `t2hk`) convert like `s2twp`.
    fn target(self) -> Option<Variant> {
        match self {
            VariantCode::S2t | VariantCode::Hk2t | VariantCode::Tw2t => Some(Variant::ZhHant),
            VariantCode::T2s | VariantCode::Tw2s | VariantCode::Hk2s => Some(Variant::ZhHans),
            VariantCode::Tw2sp => Some(Variant::ZhCN),
            VariantCode::S2tw | VariantCode::S2twp | VariantCode::T2tw => Some(Variant::ZhTW),
            VariantCode::S2hk | VariantCode::T2hk => Some(Variant::ZhHK),
            VariantCode::T2jp | VariantCode::Jp2t => None,
        }
    }

    /// Whether the conversion engine can apply this code.
    pub fn is_supported(self) -> bool {
        self.target().is_some()
    }
}

impl std::fmt::Display for VariantCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure text conversion: (text, code) -> text.
pub trait Converter {
    fn convert(&self, text: &str, code: VariantCode) -> String;
}

/// zhconv-backed converter. Codes without a zhconv target leave text unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZhConverter;

impl Converter for ZhConverter {
    fn convert(&self, text: &str, code: VariantCode) -> String {
        match code.target() {
            Some(target) => zhconv(text, target),
            None => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_code_accepts_every_listed_code() {
        for code in VariantCode::ALL {
            assert_eq!(VariantCode::from_code(code.as_str()), Some(code));
        }
    }

    #[test]
    fn from_code_is_case_insensitive_and_strips_json_suffix() {
        assert_eq!(VariantCode::from_code("S2T"), Some(VariantCode::S2t));
        assert_eq!(VariantCode::from_code("tw2sp.json"), Some(VariantCode::Tw2sp));
        assert_eq!(VariantCode::from_code(" hk2s "), Some(VariantCode::Hk2s));
    }

    #[test]
    fn from_code_rejects_unknown() {
        assert_eq!(VariantCode::from_code("s2x"), None);
        assert_eq!(VariantCode::from_code(""), None);
    }

    #[test]
    fn japanese_codes_are_unsupported() {
        assert!(!VariantCode::T2jp.is_supported());
        assert!(!VariantCode::Jp2t.is_supported());
        assert!(VariantCode::S2t.is_supported());
    }

    #[test]
    fn s2t_converts_to_traditional() {
        let out = ZhConverter.convert("天干物燥 小心火烛", VariantCode::S2t);
        assert_eq!(out, "天乾物燥 小心火燭");
    }

    #[test]
    fn conversion_is_idempotent_for_its_target() {
        let input = "天干物燥 小心火烛";
        for code in [VariantCode::S2t, VariantCode::T2s, VariantCode::Tw2t] {
            let once = ZhConverter.convert(input, code);
            let twice = ZhConverter.convert(&once, code);
            assert_eq!(once, twice, "code {}", code);
        }
    }

    #[test]
    fn taiwan_codes_share_regional_phrasing() {
        let input = "软件和内存";
        let phrased = ZhConverter.convert(input, VariantCode::S2twp);
        assert_eq!(ZhConverter.convert(input, VariantCode::S2tw), phrased);
        assert_eq!(VariantCode::S2tw.target(), VariantCode::T2tw.target());
        assert_ne!(VariantCode::S2tw.target(), VariantCode::S2t.target());
    }

    #[test]
    fn unsupported_code_passes_text_through() {
        let input = "漢字のテスト";
        assert_eq!(ZhConverter.convert(input, VariantCode::T2jp), input);
    }
}
