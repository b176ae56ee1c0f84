//! Language code tables for Whisper-style multilingual models.

/// Language codes understood by Whisper-style multilingual models.
///
/// Record `language` fields must come from this set; unknown codes are rejected
/// at option-validation time rather than surfacing as bad training data later.
pub const LANGUAGES: [&str; 99] = [
    "en", "zh", "de", "es", "ru", "ko", "fr", "ja", "pt", "tr", "pl", "ca", "nl", "ar", "sv", "it",
    "id", "hi", "fi", "vi", "he", "uk", "el", "ms", "cs", "ro", "da", "hu", "ta", "no", "th", "ur",
    "hr", "bg", "lt", "la", "mi", "ml", "cy", "sk", "te", "fa", "lv", "bn", "sr", "az", "sl", "kn",
    "et", "mk", "br", "eu", "is", "hy", "ne", "mn", "bs", "kk", "sq", "sw", "gl", "mr", "pa", "si",
    "km", "sn", "yo", "so", "af", "oc", "ka", "be", "tg", "sd", "gu", "am", "yi", "lo", "uz", "fo",
    "ht", "ps", "tk", "nn", "mt", "sa", "lb", "my", "bo", "tl", "mg", "as", "tt", "haw", "ln",
    "ha", "ba", "jw", "su",
];

// Languages written without spaces between words: Chinese, Japanese, Thai, Lao, Burmese.
const SPACELESS: [&str; 5] = ["zh", "ja", "th", "lo", "my"];

/// Whether `code` is a known language code.
pub fn is_supported(code: &str) -> bool {
    LANGUAGES.contains(&code)
}

/// Whether the language separates words with spaces.
///
/// Controls the single leading space prepended to each utterance's text inside
/// a window (space-less scripts get the text verbatim).
pub fn uses_word_spaces(code: &str) -> bool {
    !SPACELESS.contains(&code)
}
