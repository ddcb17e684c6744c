//! Built-in tool catalog.
//!
//! Every built-in tool starts disabled; backends that need credentials read
//! them from `env`, which clients fill in through the management API.

use std::collections::BTreeMap;

use toolchat_core::tool::{OperationDescriptor, PackageRegistry, PackageSpec, Tool};

/// The tools the server knows about out of the box, in display order.
pub fn builtin_tools() -> Vec<Tool> {
    vec![
        Tool {
            id: "exa".into(),
            name: "Exa".into(),
            icon_url: "https://exa.ai/images/favicon-32x32.png".into(),
            package: npm("exa-mcp-server"),
            args: None,
            env: env(&["EXA_API_KEY"]),
            enabled: false,
            operations: operations(&[(
                "web_search_exa",
                "Search the web with Exa",
                "Searching the web with Exa",
                "Searched the web with Exa",
            )]),
        },
        Tool {
            id: "sequentialThinking".into(),
            name: "Sequential Thinking".into(),
            icon_url: String::new(),
            package: npm("@modelcontextprotocol/server-sequential-thinking"),
            args: None,
            env: BTreeMap::new(),
            enabled: false,
            operations: operations(&[(
                "sequentialthinking",
                "Break a problem into revisable thinking steps",
                "Thinking sequentially",
                "Thought sequentially",
            )]),
        },
        Tool {
            id: "fileSystem".into(),
            name: "File System".into(),
            icon_url: String::new(),
            package: npm("@modelcontextprotocol/server-filesystem"),
            args: Some(Vec::new()),
            env: BTreeMap::new(),
            enabled: false,
            operations: operations(&[
                ("read_file", "Read a file", "Reading a file", "Read a file"),
                ("write_file", "Write a file", "Writing a file", "Wrote a file"),
                (
                    "list_directory",
                    "List a directory",
                    "Listing a directory",
                    "Listed a directory",
                ),
                ("search_files", "Search for files", "Searching files", "Searched files"),
            ]),
        },
        Tool {
            id: "linear".into(),
            name: "Linear".into(),
            icon_url: "https://linear.app/favicon.ico".into(),
            package: npm("linear-mcp-server"),
            args: None,
            env: env(&["LINEAR_API_KEY"]),
            enabled: false,
            operations: operations(&[
                (
                    "linear_search_issues",
                    "Search Linear issues",
                    "Searching Linear issues",
                    "Searched Linear issues",
                ),
                (
                    "linear_create_issue",
                    "Create a Linear issue",
                    "Creating a Linear issue",
                    "Created a Linear issue",
                ),
            ]),
        },
        Tool {
            id: "e2b".into(),
            name: "E2B".into(),
            icon_url: "https://e2b.dev/favicon.ico".into(),
            package: PackageSpec {
                registry: PackageRegistry::Pypi,
                name: "e2b-mcp-server".into(),
            },
            args: None,
            env: env(&["E2B_API_KEY"]),
            enabled: false,
            operations: operations(&[(
                "run_code",
                "Run Python code in a sandbox",
                "Executing code with E2B",
                "Executed code with E2B",
            )]),
        },
    ]
}

/// The built-in catalog with `overrides` applied: an override with a known id
/// replaces that tool in place, unknown ids are appended.
pub fn load_catalog(overrides: &[Tool]) -> Vec<Tool> {
    let mut tools = builtin_tools();
    for tool in overrides {
        match tools.iter_mut().find(|t| t.id == tool.id) {
            Some(existing) => *existing = tool.clone(),
            None => tools.push(tool.clone()),
        }
    }
    tools
}

fn npm(name: &str) -> PackageSpec {
    PackageSpec {
        registry: PackageRegistry::Npm,
        name: name.into(),
    }
}

fn env(keys: &[&str]) -> BTreeMap<String, String> {
    keys.iter().map(|k| (k.to_string(), String::new())).collect()
}

fn operations(entries: &[(&str, &str, &str, &str)]) -> BTreeMap<String, OperationDescriptor> {
    entries
        .iter()
        .map(|(id, description, progress, done)| {
            (
                id.to_string(),
                OperationDescriptor {
                    description: description.to_string(),
                    progress_label: progress.to_string(),
                    done_label: done.to_string(),
                },
            )
        })
        .collect()
}
