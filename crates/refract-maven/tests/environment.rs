//! End-to-end: an environment assembled from the Maven recipe registry and
//! declarative YAML, activated by name and run against a POM document.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use refract_core::environment::Environment;
use refract_core::execution::ExecutionContext;
use refract_core::loader::YamlResourceLoader;
use refract_core::tree::XmlDocument;
use refract_maven::cache::InMemoryPomCache;
use refract_maven::download::{MavenDownloader, MavenTransport};
use refract_maven::recipes;
use refract_maven::repository::Repository;

struct StaticTransport(HashMap<String, String>);

impl MavenTransport for StaticTransport {
    fn get(&self, url: &str) -> miette::Result<Option<Vec<u8>>> {
        Ok(self.0.get(url).map(|body| body.as_bytes().to_vec()))
    }
}

const POM: &str = r#"<project>
    <parent>
        <groupId>org.springframework.boot</groupId>
        <artifactId>spring-boot-starter-parent</artifactId>
        <version>2.3.0</version>
    </parent>
    <artifactId>demo</artifactId>
</project>"#;

fn downloader() -> Arc<MavenDownloader> {
    let mut responses = HashMap::new();
    responses.insert(
        "https://repo.example.com/org/springframework/boot/spring-boot-starter-parent/maven-metadata.xml".to_string(),
        "<metadata><versioning><versions>\
         <version>2.3.0</version><version>2.3.1</version>\
         <version>2.4.0</version><version>3.0.0-M1</version>\
         </versions></versioning></metadata>"
            .to_string(),
    );
    Arc::new(MavenDownloader::new(
        Arc::new(InMemoryPomCache::new()),
        Arc::new(StaticTransport(responses)),
    ))
}

fn repos() -> Vec<Repository> {
    vec![Repository::new("test", "https://repo.example.com")]
}

#[test]
fn declarative_recipe_configures_and_runs_the_upgrade() {
    let yaml = r#"
type: specs.openrewrite.org/v1beta/recipe
name: com.example.UpgradeBoot
displayName: Upgrade Spring Boot parent
recipeList:
  - refract.maven.UpgradeParentVersion:
      groupId: org.springframework.boot
      artifactId: spring-boot-starter-parent
      newVersion: 2.X
"#;
    let env = Environment::builder()
        .register(recipes::registry(downloader(), repos()))
        .register(YamlResourceLoader::new(yaml, &BTreeMap::new()).unwrap())
        .build();

    let root = env.activate_recipes(["com.example.UpgradeBoot"]).unwrap();
    let mut ctx = ExecutionContext::new();
    let doc = XmlDocument::parse(POM).unwrap();
    let out = root.run(doc, &mut ctx).unwrap();

    assert_eq!(
        out.root.child("parent").unwrap().child_value("version"),
        Some("2.4.0")
    );
}

#[test]
fn properties_parameterize_declarative_recipes() {
    let yaml = r#"
type: specs.openrewrite.org/v1beta/recipe
name: com.example.UpgradeBoot
recipeList:
  - refract.maven.UpgradeParentVersion:
      groupId: org.springframework.boot
      artifactId: spring-boot-starter-parent
      newVersion: ${boot.selector}
"#;
    let mut properties = BTreeMap::new();
    properties.insert("boot.selector".to_string(), "2.3.X".to_string());

    let env = Environment::builder()
        .register(recipes::registry(downloader(), repos()))
        .register(YamlResourceLoader::new(yaml, &properties).unwrap())
        .build();

    let root = env.activate_recipes(["com.example.UpgradeBoot"]).unwrap();
    let mut ctx = ExecutionContext::new();
    let doc = XmlDocument::parse(POM).unwrap();
    let out = root.run(doc, &mut ctx).unwrap();

    // 2.3.X admits 2.3.1 but not 2.4.0.
    assert_eq!(
        out.root.child("parent").unwrap().child_value("version"),
        Some("2.3.1")
    );
}

#[test]
fn unknown_reference_in_declarative_recipe_fails_activation() {
    let yaml = r#"
type: specs.openrewrite.org/v1beta/recipe
name: com.example.Broken
recipeList:
  - com.example.DoesNotExist
"#;
    let env = Environment::builder()
        .register(recipes::registry(downloader(), repos()))
        .register(YamlResourceLoader::new(yaml, &BTreeMap::new()).unwrap())
        .build();

    let err = env.activate_recipes(["com.example.Broken"]).unwrap_err();
    assert!(format!("{err}").contains("com.example.DoesNotExist"));
}

#[test]
fn misconfigured_options_fail_activation() {
    let yaml = r#"
type: specs.openrewrite.org/v1beta/recipe
name: com.example.Misconfigured
recipeList:
  - refract.maven.UpgradeParentVersion:
      groupId: org.springframework.boot
"#;
    let env = Environment::builder()
        .register(recipes::registry(downloader(), repos()))
        .register(YamlResourceLoader::new(yaml, &BTreeMap::new()).unwrap())
        .build();

    assert!(env.activate_recipes(["com.example.Misconfigured"]).is_err());
}

#[test]
fn invalid_selector_in_options_fails_activation() {
    let yaml = r#"
type: specs.openrewrite.org/v1beta/recipe
name: com.example.BadSelector
recipeList:
  - refract.maven.UpgradeParentVersion:
      groupId: org.springframework.boot
      artifactId: spring-boot-starter-parent
      newVersion: "[2.0,"
"#;
    let env = Environment::builder()
        .register(recipes::registry(downloader(), repos()))
        .register(YamlResourceLoader::new(yaml, &BTreeMap::new()).unwrap())
        .build();

    assert!(env.activate_recipes(["com.example.BadSelector"]).is_err());
}
