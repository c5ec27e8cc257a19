//! core::manifest::schema
//!
//! On-disk manifest format.
//!
//! ```xml
//! <Dependencies>
//!   <ProductDependencies>
//!     <Dependency Name="Microsoft.NETCore.App" Version="8.0.0">
//!       <Uri>https://github.com/dotnet/runtime</Uri>
//!       <Sha>0123456789abcdef0123456789abcdef01234567</Sha>
//!     </Dependency>
//!   </ProductDependencies>
//!   <ToolsetDependencies>
//!     <Dependency Name="Microsoft.DotNet.Arcade.Sdk" Version="8.0.0-beta">
//!       <Uri>https://github.com/dotnet/arcade</Uri>
//!       <Sha>89abcdef0123456789abcdef0123456789abcdef</Sha>
//!     </Dependency>
//!   </ToolsetDependencies>
//! </Dependencies>
//! ```
//!
//! The section is the toolset tag. Attributes and elements other than
//! `<Uri>` and `<Sha>` are carried by real manifests and ignored here.

use serde::Deserialize;

/// A parsed manifest file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename = "Dependencies")]
pub struct ManifestFile {
    #[serde(default, rename = "ProductDependencies")]
    pub product: DependencySection,

    #[serde(default, rename = "ToolsetDependencies")]
    pub toolset: DependencySection,
}

impl ManifestFile {
    /// Every declaration with its toolset flag, product section first.
    pub fn declarations(&self) -> impl Iterator<Item = (&Declaration, bool)> {
        self.product
            .dependencies
            .iter()
            .map(|d| (d, false))
            .chain(self.toolset.dependencies.iter().map(|d| (d, true)))
    }
}

/// `<ProductDependencies>` or `<ToolsetDependencies>`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DependencySection {
    #[serde(default, rename = "Dependency")]
    pub dependencies: Vec<Declaration>,
}

/// One `<Dependency>` element.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Declaration {
    /// Package name
    #[serde(default, rename = "@Name")]
    pub name: Option<String>,

    /// Package version
    #[serde(default, rename = "@Version")]
    pub version: Option<String>,

    /// Repository URI to fetch from
    #[serde(rename = "Uri")]
    pub uri: String,

    /// Pinned revision
    #[serde(rename = "Sha")]
    pub sha: String,
}
