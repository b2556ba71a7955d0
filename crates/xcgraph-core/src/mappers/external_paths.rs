//! Relocation of generated projects for external dependencies.
//!
//! External projects live in package checkouts that must stay untouched, so their
//! generated project files are written to a derived directory under the graph root
//! instead. Since the project file no longer sits next to the sources, the project
//! gets an explicit `SRCROOT` pointing back at them.

use std::path::PathBuf;
use tracing::debug;

use super::{GraphMapper, Result};
use crate::graph::Graph;
use crate::model::SRCROOT_SETTING;
use crate::paths::absolutize;
use crate::side_effects::SideEffect;

/// Rewrites where generated projects of external dependencies are written.
#[derive(Debug, Clone)]
pub struct ExternalDependencyPathMapper {
    /// Relative to the graph root unless absolute.
    directory: PathBuf,
    derived_directory_name: String,
}

impl ExternalDependencyPathMapper {
    pub fn new(directory: impl Into<PathBuf>, derived_directory_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            derived_directory_name: derived_directory_name.into(),
        }
    }
}

impl GraphMapper for ExternalDependencyPathMapper {
    fn name(&self) -> &str {
        "external-dependency-path"
    }

    fn map(&self, graph: Graph) -> Result<(Graph, Vec<SideEffect>)> {
        let directory = absolutize(&graph.path, &self.directory);
        let external: Vec<PathBuf> = graph
            .projects
            .values()
            .filter(|project| project.is_external())
            .map(|project| project.path.clone())
            .collect();

        let mut graph = graph;
        let mut side_effects = Vec::with_capacity(external.len());
        for path in external {
            let Some(project) = graph.project_mut(&path) else {
                continue;
            };
            let project_directory = directory.join(&project.name);
            project.xcodeproj_path = project_directory.join(format!("{}.xcodeproj", project.name));
            if !project.settings.contains_key(SRCROOT_SETTING) {
                project.settings.insert(
                    SRCROOT_SETTING.to_string(),
                    project.source_root.display().to_string(),
                );
            }
            debug!(
                "Generating external project {} at {}",
                project.name,
                project.xcodeproj_path.display()
            );
            side_effects.push(SideEffect::Directory {
                path: project_directory.join(&self.derived_directory_name),
            });
        }

        Ok((graph, side_effects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Platform, Product, Project, Target, Workspace};
    use crate::node::GraphNode;
    use std::path::Path;
    use std::sync::Arc;

    const ROOT: &str = "/repo";
    const PKG: &str = "/repo/.build/checkouts/Alamofire";

    fn graph(pkg: Project) -> Graph {
        let mut graph = Graph::new("App", ROOT, Workspace::new(ROOT, "App", vec![]));
        let app = Project::new(
            "/repo/App",
            "App",
            vec![Target::new("App", Product::App, [Platform::IOS])],
        );
        for project in [app, pkg] {
            for target in &project.targets {
                graph.add_node(GraphNode::target(project.path.clone(), target.name.clone()));
            }
            graph.add_project(Arc::new(project));
        }
        graph
    }

    fn alamofire() -> Project {
        Project::new(
            PKG,
            "Alamofire",
            vec![Target::new("Alamofire", Product::Framework, [Platform::IOS])],
        )
        .external()
    }

    #[test]
    fn test_relocates_external_projects() {
        let mapper = ExternalDependencyPathMapper::new(".build/derived", "Derived");

        let (graph, side_effects) = mapper.map(graph(alamofire())).unwrap();

        let project = graph.project(Path::new(PKG)).unwrap();
        assert_eq!(
            project.xcodeproj_path,
            PathBuf::from("/repo/.build/derived/Alamofire/Alamofire.xcodeproj")
        );
        assert_eq!(
            project.settings.get(SRCROOT_SETTING).map(String::as_str),
            Some(PKG)
        );
        assert_eq!(
            side_effects,
            vec![SideEffect::Directory {
                path: PathBuf::from("/repo/.build/derived/Alamofire/Derived")
            }]
        );
    }

    #[test]
    fn test_keeps_existing_srcroot() {
        let mut pkg = alamofire();
        pkg.settings
            .insert(SRCROOT_SETTING.to_string(), "/custom/src".to_string());
        let mapper = ExternalDependencyPathMapper::new("/tmp/external", "Derived");

        let (graph, _) = mapper.map(graph(pkg)).unwrap();

        let project = graph.project(Path::new(PKG)).unwrap();
        assert_eq!(project.settings[SRCROOT_SETTING], "/custom/src");
        assert_eq!(
            project.xcodeproj_path,
            PathBuf::from("/tmp/external/Alamofire/Alamofire.xcodeproj")
        );
    }

    #[test]
    fn test_local_projects_are_untouched() {
        let mapper = ExternalDependencyPathMapper::new(".build/derived", "Derived");

        let (graph, _) = mapper.map(graph(alamofire())).unwrap();

        let app = graph.project(Path::new("/repo/App")).unwrap();
        assert_eq!(app.xcodeproj_path, PathBuf::from("/repo/App/App.xcodeproj"));
        assert!(app.settings.is_empty());
    }
}
