use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FORMAT_CODE: Regex =
        Regex::new(r"§[0-9a-fk-orA-FK-OR]").expect("Failed to compile FORMAT_CODE regex");
}

/// Removes `§` colour and style codes from server supplied text.
pub fn strip_codes(text: &str) -> String {
    FORMAT_CODE.replace_all(text, "").into_owned()
}
