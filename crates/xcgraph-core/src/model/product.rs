//! Product kinds a target can build.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of artifact a target produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    App,
    AppClip,
    AppExtension,
    Watch2App,
    Watch2Extension,
    StaticLibrary,
    DynamicLibrary,
    Framework,
    StaticFramework,
    Bundle,
    UnitTests,
    UiTests,
    CommandLineTool,
    Macro,
    Xpc,
    SystemExtension,
}

impl Product {
    /// Get the string representation used in manifests and config files
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::App => "app",
            Product::AppClip => "app_clip",
            Product::AppExtension => "app_extension",
            Product::Watch2App => "watch2_app",
            Product::Watch2Extension => "watch2_extension",
            Product::StaticLibrary => "static_library",
            Product::DynamicLibrary => "dynamic_library",
            Product::Framework => "framework",
            Product::StaticFramework => "static_framework",
            Product::Bundle => "bundle",
            Product::UnitTests => "unit_tests",
            Product::UiTests => "ui_tests",
            Product::CommandLineTool => "command_line_tool",
            Product::Macro => "macro",
            Product::Xpc => "xpc",
            Product::SystemExtension => "system_extension",
        }
    }

    /// Products linked statically into their consumers.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            Product::StaticLibrary | Product::StaticFramework | Product::Macro
        )
    }

    /// Products loaded at runtime from the consumer's bundle.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Product::DynamicLibrary | Product::Framework)
    }

    /// Products that can be launched.
    pub fn runnable(&self) -> bool {
        matches!(
            self,
            Product::App
                | Product::AppClip
                | Product::CommandLineTool
                | Product::Watch2App
                | Product::AppExtension
        )
    }

    /// Whether a unit test bundle can be hosted by this product.
    pub fn can_host_tests(&self) -> bool {
        matches!(self, Product::App | Product::AppClip | Product::Watch2App)
    }

    /// Whether the product is a test bundle.
    pub fn is_test(&self) -> bool {
        matches!(self, Product::UnitTests | Product::UiTests)
    }

    /// Whether the product links static dependencies into its own binary.
    pub fn can_link_static_products(&self) -> bool {
        !matches!(
            self,
            Product::StaticLibrary | Product::StaticFramework | Product::Bundle | Product::Macro
        )
    }

    /// File extension of the built product.
    pub fn extension(&self) -> &'static str {
        match self {
            Product::App | Product::AppClip | Product::Watch2App => "app",
            Product::AppExtension | Product::Watch2Extension => "appex",
            Product::StaticLibrary => "a",
            Product::DynamicLibrary => "dylib",
            Product::Framework | Product::StaticFramework => "framework",
            Product::Bundle => "bundle",
            Product::UnitTests | Product::UiTests => "xctest",
            Product::CommandLineTool | Product::Macro => "",
            Product::Xpc => "xpc",
            Product::SystemExtension => "systemextension",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let product = match s.to_lowercase().replace('-', "_").as_str() {
            "app" => Product::App,
            "app_clip" => Product::AppClip,
            "app_extension" => Product::AppExtension,
            "watch2_app" => Product::Watch2App,
            "watch2_extension" => Product::Watch2Extension,
            "static_library" => Product::StaticLibrary,
            "dynamic_library" => Product::DynamicLibrary,
            "framework" => Product::Framework,
            "static_framework" => Product::StaticFramework,
            "bundle" => Product::Bundle,
            "unit_tests" => Product::UnitTests,
            "ui_tests" => Product::UiTests,
            "command_line_tool" => Product::CommandLineTool,
            "macro" => Product::Macro,
            "xpc" => Product::Xpc,
            "system_extension" => Product::SystemExtension,
            other => return Err(format!("unknown product '{}'", other)),
        };
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_and_dynamic_are_disjoint() {
        for product in [
            Product::App,
            Product::StaticLibrary,
            Product::DynamicLibrary,
            Product::Framework,
            Product::StaticFramework,
            Product::Bundle,
        ] {
            assert!(!(product.is_static() && product.is_dynamic()), "{product}");
        }
    }

    #[test]
    fn test_static_products_cannot_link_static_products() {
        assert!(!Product::StaticFramework.can_link_static_products());
        assert!(!Product::StaticLibrary.can_link_static_products());
        assert!(Product::Framework.can_link_static_products());
        assert!(Product::App.can_link_static_products());
    }

    #[test]
    fn test_product_from_str() {
        for product in [Product::StaticFramework, Product::UnitTests, Product::AppClip] {
            assert_eq!(product.as_str().parse::<Product>().unwrap(), product);
        }
        assert_eq!("static-framework".parse::<Product>().unwrap(), Product::StaticFramework);
        assert!("kext".parse::<Product>().is_err());
    }
}
