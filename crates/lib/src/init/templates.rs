//! Starter files written by `airpack init`.

/// Starter `airpack.toml`. `{bundle_name}` is substituted.
pub const MANIFEST_TEMPLATE: &str = r#"# airpack bundle manifest.

[bundle]
name = "{bundle_name}"

[interpreter]
version = "3.11"

# One table per top-level package; dependencies are resolved from the index.
# [[package]]
# name = "requests"
# version = ">=2.31,<3"

[app]
source = "app"
entry = "main.py"

[build]
# mirror = "https://mirror.example/simple"
# index = "index.json"
format = "zip"
"#;

/// Starter application entry point.
pub const MAIN_PY_TEMPLATE: &str = r#"import sys


def main():
    print("hello from the offline bundle")
    return 0


if __name__ == "__main__":
    sys.exit(main())
"#;
