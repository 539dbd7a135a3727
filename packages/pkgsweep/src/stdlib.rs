//! Catalogue of runtime-builtin packages.
//!
//! These ship with every runtime build and are pre-installed, so the
//! sweep treats them as passed without executing anything. The table is
//! compiled in; ids are stable across runs.

use crate::package::Package;
use std::path::PathBuf;
use uuid::{uuid, Uuid};

/// (name, id, dependency names) for every builtin package.
const BUILTINS: &[(&str, Uuid, &[&str])] = &[
    ("Base64", uuid!("2a0f44e3-6c83-55bd-87e4-b1978d98bd5f"), &[]),
    ("SHA", uuid!("ea8e919c-243c-51af-8825-aaa63cd721ce"), &[]),
    ("Logging", uuid!("56ddb016-857b-54e1-b83d-db4d58db5568"), &[]),
    ("Unicode", uuid!("4ec0a83e-493e-50e2-b9ac-8f72acf5a8f5"), &[]),
    ("Mmap", uuid!("a63ad114-7e13-5084-954f-fe012c677804"), &[]),
    (
        "Serialization",
        uuid!("9e88b42a-f829-5b0c-bbe9-9e923198166b"),
        &[],
    ),
    (
        "Random",
        uuid!("9a3f8284-a2c9-5f02-9a11-845980a1fd5c"),
        &["SHA", "Serialization"],
    ),
    ("Dates", uuid!("ade2ca70-3891-5945-98fb-dc099432e06a"), &[]),
    (
        "Printf",
        uuid!("de0858da-6303-5e67-8744-51eddeeeb8d7"),
        &["Unicode"],
    ),
    (
        "UUIDs",
        uuid!("cf7118a7-6976-5b1a-9a39-7adc72f591a4"),
        &["Random", "SHA"],
    ),
    (
        "TOML",
        uuid!("fa267f1f-6049-4f14-aa54-33bafae1ed76"),
        &["Dates"],
    ),
    (
        "LinearAlgebra",
        uuid!("37e2e46d-f89d-539d-b4ee-838fcccc9c8e"),
        &[],
    ),
    (
        "Statistics",
        uuid!("10745b16-79ce-11e8-11f9-7d13ad32a3b2"),
        &["LinearAlgebra"],
    ),
    ("Sockets", uuid!("6462fe0b-24de-5631-8697-dd941f90decc"), &[]),
    (
        "Distributed",
        uuid!("8ba89e20-285c-5b6f-9357-94700520ee1b"),
        &["Random", "Serialization", "Sockets"],
    ),
    (
        "Test",
        uuid!("8dfed614-e22c-5e08-85e1-65c5234f0b40"),
        &["Logging", "Random", "Serialization"],
    ),
    (
        "Tar",
        uuid!("a4e569a6-e804-4fa4-b0f3-eef7a1d5b13e"),
        &["SHA"],
    ),
    (
        "Downloads",
        uuid!("f43a241f-c20a-4ad4-852c-f6b1247861c6"),
        &["Sockets"],
    ),
];

/// All builtin packages as records (no version, no registry of origin).
pub fn packages() -> Vec<Package> {
    BUILTINS
        .iter()
        .map(|(name, id, _)| Package {
            name: (*name).to_string(),
            id: *id,
            metadata_path: PathBuf::new(),
            version: None,
            registry: None,
        })
        .collect()
}

/// Builtin inter-dependencies as (dependent id, dependency id) pairs.
pub fn dependency_pairs() -> Vec<(Uuid, Uuid)> {
    let mut pairs = Vec::new();
    for (_, id, deps) in BUILTINS {
        for dep_name in *deps {
            let dep = BUILTINS
                .iter()
                .find(|(name, _, _)| name == dep_name)
                .map(|(_, dep_id, _)| *dep_id);
            // The table is closed under dependencies by construction.
            if let Some(dep) = dep {
                pairs.push((*id, dep));
            }
        }
    }
    pairs
}
