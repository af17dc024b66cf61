#![no_main]

use clusterbind_core::decoder::{DecodeError, Resolution, decode, extract_namespace};
use clusterbind_core::model::Artifact;
use indexmap::IndexMap;
use libfuzzer_sys::fuzz_target;

// Input layout: first byte picks the requested key, the rest is split on
// NUL into data values stored under "k0", "k1", ...
fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };

    let values: IndexMap<String, String> = rest
        .split(|b| *b == 0)
        .take(8)
        .enumerate()
        .map(|(i, chunk)| (format!("k{i}"), String::from_utf8_lossy(chunk).into_owned()))
        .collect();
    let requested = format!("k{}", selector % 10);
    let artifact = Artifact {
        name: "fuzz".to_string(),
        namespace: "fuzz".to_string(),
        data: Some(values.clone()),
    };

    match decode(&artifact, &requested) {
        Ok(decoded) => {
            assert!(values.contains_key(&decoded.key));
            assert_eq!(decoded.fell_back, !values.contains_key(&requested));
            if let Resolution::Resolved(namespace) = decoded.resolution() {
                assert!(!namespace.is_empty());
                assert!(!namespace.chars().any(char::is_whitespace));
                let embedded = decoded.embedded.as_deref().unwrap_or_default();
                assert_eq!(extract_namespace(embedded).as_deref(), Some(namespace));
            }
        }
        Err(err) => {
            assert_eq!(err, DecodeError::NoData);
            assert!(values.is_empty());
        }
    }
});
