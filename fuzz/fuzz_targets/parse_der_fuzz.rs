//! Parser fuzz target: feed arbitrary bytes to the DER descriptor set.
//! The parser must not panic; it should return Ok(FieldTree) or Err(ParseError).
//! Build with: cargo fuzz run parse_der_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use std::sync::{Arc, OnceLock};

    static PARSER: OnceLock<bitschema::Parser> = OnceLock::new();
    let parser = PARSER.get_or_init(|| {
        let schema = bitschema::der::schema().expect("der schema");
        bitschema::Parser::new(Arc::new(schema))
    });
    for type_name in [bitschema::der::MESSAGE, bitschema::der::SUBIDENTIFIER] {
        if let Ok(tree) = parser.parse(type_name, data) {
            let _ = tree.to_string();
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parse_der_fuzz");
}
