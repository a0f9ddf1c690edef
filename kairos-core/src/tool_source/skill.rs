//! Skills (spec §3 `Skill`, §4.2 supplemental): a directory of named,
//! file-backed capabilities exposed to the agent as a progressive-disclosure
//! tool pair rather than loaded into context up front.
//!
//! Grounded in the teacher's `tools::skill::SkillTool` (load skill content by
//! name from a working-folder subdirectory) and `tool_source::yaml_specs`
//! (YAML-described tool specs loaded from disk at startup). Generalized from
//! "one `skill` tool that returns file content" to per-skill
//! `activate_<name>` / `read_<name>_<n>` tools, since the broker must expose
//! each skill's activation and resources as distinct, individually
//! approvable/filterable tool names (spec §4.2).

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glob::Pattern;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::message::ToolDefinition;

use super::ToolContext;
use super::ToolSource;

/// One skill manifest, loaded from `<dir>/<name>/skill.yaml`.
#[derive(Clone, Debug, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub body: String,
    #[serde(default)]
    pub resources: Vec<SkillResource>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SkillResource {
    pub name: String,
    pub path: String,
}

impl Skill {
    fn activate_tool_name(&self) -> String {
        format!("activate_{}", self.name)
    }

    fn resource_tool_name(&self, index: usize) -> String {
        format!("read_{}_{}", self.name, index)
    }

    fn allows(&self, tool_name: &str) -> bool {
        self.allowed_tools.is_empty()
            || self
                .allowed_tools
                .iter()
                .any(|g| Pattern::new(g).map(|p| p.matches(tool_name)).unwrap_or(false))
    }
}

/// A `ToolSource` that loads skills from a directory of `<name>/skill.yaml`
/// manifests and exposes each as an `activate_<name>` tool plus one
/// `read_<name>_<n>` tool per declared resource.
pub struct SkillToolSource {
    skills: Vec<Skill>,
    root: PathBuf,
}

impl SkillToolSource {
    /// Scans `dir` for immediate subdirectories containing a `skill.yaml`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let mut skills = Vec::new();
        let entries = fs::read_dir(&root)
            .map_err(|e| AgentError::internal(format!("reading skills dir: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| AgentError::internal(format!("reading skills dir entry: {e}")))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let manifest_path = path.join("skill.yaml");
            if !manifest_path.is_file() {
                continue;
            }
            let raw = fs::read_to_string(&manifest_path)
                .map_err(|e| AgentError::internal(format!("reading {}: {e}", manifest_path.display())))?;
            let skill: Skill = serde_yaml::from_str(&raw)
                .map_err(|e| AgentError::invalid_input(format!("parsing {}: {e}", manifest_path.display())))?;
            skills.push(skill);
        }
        Ok(Self { skills, root })
    }

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    fn find_skill_for_tool(&self, name: &str) -> Option<(&Skill, ToolKind)> {
        for skill in &self.skills {
            if name == skill.activate_tool_name() {
                return Some((skill, ToolKind::Activate));
            }
            for (idx, _) in skill.resources.iter().enumerate() {
                if name == skill.resource_tool_name(idx) {
                    return Some((skill, ToolKind::Resource(idx)));
                }
            }
        }
        None
    }
}

enum ToolKind {
    Activate,
    Resource(usize),
}

#[async_trait]
impl ToolSource for SkillToolSource {
    fn source_name(&self) -> &str {
        "skill"
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let mut defs = Vec::new();
        for skill in &self.skills {
            defs.push(ToolDefinition {
                name: skill.activate_tool_name(),
                description: skill.description.clone(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            });
            for (idx, resource) in skill.resources.iter().enumerate() {
                let tool_name = skill.resource_tool_name(idx);
                if !skill.allows(&tool_name) {
                    continue;
                }
                defs.push(ToolDefinition {
                    name: tool_name,
                    description: format!("read resource '{}' of skill '{}'", resource.name, skill.name),
                    parameters: serde_json::json!({"type": "object", "properties": {}}),
                });
            }
        }
        Ok(defs)
    }

    async fn call_tool(&self, _ctx: &ToolContext, name: &str, _arguments: Value) -> Result<String> {
        let (skill, kind) = self
            .find_skill_for_tool(name)
            .ok_or_else(|| AgentError::not_found(format!("no skill tool named {name}")))?;
        match kind {
            ToolKind::Activate => Ok(skill.body.clone()),
            ToolKind::Resource(idx) => {
                let resource = &skill.resources[idx];
                let path = self.root.join(&skill.name).join(&resource.path);
                fs::read_to_string(&path)
                    .map_err(|e| AgentError::internal(format!("reading resource {}: {e}", path.display())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_skill(dir: &Path, name: &str, yaml: &str) {
        let skill_dir = dir.join(name);
        fs::create_dir_all(&skill_dir).unwrap();
        let mut f = fs::File::create(skill_dir.join("skill.yaml")).unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn loads_skill_and_exposes_activate_tool() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(
            tmp.path(),
            "reviewer",
            "name: reviewer\ndescription: reviews code\nbody: |\n  follow these steps\n",
        );
        let source = SkillToolSource::load_from_dir(tmp.path()).unwrap();
        let defs = source.list_tools().await.unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "activate_reviewer");
        let out = source
            .call_tool(&ToolContext::default(), "activate_reviewer", Value::Null)
            .await
            .unwrap();
        assert!(out.contains("follow these steps"));
    }

    #[tokio::test]
    async fn exposes_resource_tools_and_reads_resource_file() {
        let tmp = tempfile::tempdir().unwrap();
        let skill_dir = tmp.path().join("writer");
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(skill_dir.join("notes.md"), "some notes").unwrap();
        write_skill(
            tmp.path(),
            "writer",
            "name: writer\ndescription: writes docs\nbody: write stuff\nresources:\n  - name: notes\n    path: notes.md\n",
        );
        let source = SkillToolSource::load_from_dir(tmp.path()).unwrap();
        let defs = source.list_tools().await.unwrap();
        assert_eq!(defs.len(), 2);
        let out = source
            .call_tool(&ToolContext::default(), "read_writer_0", Value::Null)
            .await
            .unwrap();
        assert_eq!(out, "some notes");
    }

    #[tokio::test]
    async fn resource_tools_respect_allowed_tools_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let skill_dir = tmp.path().join("locked");
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(skill_dir.join("secret.md"), "secret").unwrap();
        write_skill(
            tmp.path(),
            "locked",
            "name: locked\ndescription: locked skill\nbody: body\nresources:\n  - name: secret\n    path: secret.md\nallowed_tools:\n  - activate_locked\n",
        );
        let source = SkillToolSource::load_from_dir(tmp.path()).unwrap();
        let defs = source.list_tools().await.unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "activate_locked");
    }
}
