//! Upgrade a POM's `<parent>` coordinate to the newest version matching a
//! selector.

use std::sync::Arc;

use refract_core::recipe::Recipe;
use refract_core::visitor::{change_tag_value, TreeVisitor};

use crate::coordinate::GroupArtifact;
use crate::download::MavenDownloader;
use crate::repository::Repository;
use crate::selector::VersionComparator;

/// Build the upgrade-parent recipe.
///
/// The selector and metadata pattern are validated here; an invalid
/// selector fails construction and the recipe never runs. The visitor
/// matches the `<parent>` tag, asks the repositories for the merged
/// version listing, and schedules a follow-up visitor that rewrites the
/// `<version>` tag when a strictly newer matching version exists. A POM
/// already at the newest matching version is left untouched.
pub fn upgrade_parent_version(
    group_id: &str,
    artifact_id: &str,
    new_version: &str,
    version_pattern: Option<&str>,
    downloader: Arc<MavenDownloader>,
    repos: Vec<Repository>,
) -> miette::Result<Recipe> {
    let comparator = VersionComparator::build(new_version, version_pattern)?;
    let ga = GroupArtifact::new(group_id, artifact_id);
    let repos = Arc::new(repos);

    let visitor_factory = move || {
        let comparator = comparator.clone();
        let ga = ga.clone();
        let downloader = downloader.clone();
        let repos = repos.clone();
        TreeVisitor::for_tags(move |tag, cursor, ctx| {
            if tag.name != "parent" || cursor.path_string() != "project" {
                return Ok(tag);
            }
            if tag.child_value("groupId") != Some(&ga.group_id)
                || tag.child_value("artifactId") != Some(&ga.artifact_id)
            {
                return Ok(tag);
            }
            let Some(current) = tag.child_value("version") else {
                return Ok(tag);
            };

            let metadata = downloader.download_metadata(&ga, &repos, ctx)?;
            let candidates = metadata.versions.iter().map(String::as_str);
            if let Some(newer) = comparator.upgrade(current, candidates) {
                tracing::debug!("upgrading parent {ga} from {current} to {newer}");
                ctx.do_after_visit(change_tag_value(
                    "project/parent",
                    "version",
                    current,
                    newer,
                ));
            }
            Ok(tag)
        })
    };

    Ok(Recipe::new(
        "refract.maven.UpgradeParentVersion",
        "Upgrade Maven parent version",
        "Rewrite the <parent> version tag to the newest version matching the given selector.",
        visitor_factory,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryPomCache;
    use crate::download::MavenTransport;
    use refract_core::execution::ExecutionContext;
    use refract_core::tree::XmlDocument;
    use std::collections::HashMap;

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

    fn downloader_with_versions(versions: &[&str]) -> Arc<MavenDownloader> {
        let listing = versions
            .iter()
            .map(|v| format!("<version>{v}</version>"))
            .collect::<String>();
        let mut responses = HashMap::new();
        responses.insert(
            "https://repo.example.com/org/springframework/boot/spring-boot-starter-parent/maven-metadata.xml".to_string(),
            format!("<metadata><versioning><versions>{listing}</versions></versioning></metadata>"),
        );
        Arc::new(MavenDownloader::new(
            Arc::new(InMemoryPomCache::new()),
            Arc::new(StaticTransport(responses)),
        ))
    }

    fn repos() -> Vec<Repository> {
        vec![Repository::new("test", "https://repo.example.com")]
    }

    fn parent_version(doc: &XmlDocument) -> Option<&str> {
        doc.root.child("parent").unwrap().child_value("version")
    }

    #[test]
    fn upgrades_to_newest_matching_release() {
        let downloader = downloader_with_versions(&["2.3.0", "2.3.1", "2.4.0", "3.0.0-M1"]);
        let recipe = upgrade_parent_version(
            "org.springframework.boot",
            "spring-boot-starter-parent",
            "2.X",
            None,
            downloader,
            repos(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new();
        let doc = XmlDocument::parse(POM).unwrap();
        let out = recipe.run(doc, &mut ctx).unwrap();
        assert_eq!(parent_version(&out), Some("2.4.0"));
    }

    #[test]
    fn no_newer_match_leaves_pom_unchanged() {
        let downloader = downloader_with_versions(&["2.3.0"]);
        let recipe = upgrade_parent_version(
            "org.springframework.boot",
            "spring-boot-starter-parent",
            "2.3.X",
            None,
            downloader,
            repos(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new();
        let doc = XmlDocument::parse(POM).unwrap();
        let out = recipe.run(doc.clone(), &mut ctx).unwrap();
        assert_eq!(out, doc);
    }

    #[test]
    fn other_parents_are_ignored() {
        let downloader = downloader_with_versions(&["9.9.9"]);
        let recipe = upgrade_parent_version(
            "org.springframework.boot",
            "spring-boot-starter-parent",
            "latest.release",
            None,
            downloader,
            repos(),
        )
        .unwrap();

        let other = r#"<project>
    <parent>
        <groupId>com.example</groupId>
        <artifactId>other-parent</artifactId>
        <version>1.0</version>
    </parent>
</project>"#;
        let mut ctx = ExecutionContext::new();
        let doc = XmlDocument::parse(other).unwrap();
        let out = recipe.run(doc.clone(), &mut ctx).unwrap();
        assert_eq!(out, doc);
    }

    #[test]
    fn invalid_selector_fails_construction() {
        let downloader = downloader_with_versions(&[]);
        let result = upgrade_parent_version(
            "org.springframework.boot",
            "spring-boot-starter-parent",
            "[2.0,",
            None,
            downloader,
            repos(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn metadata_pattern_narrows_candidates() {
        let downloader = downloader_with_versions(&["2.4.0", "2.5.0-rest"]);
        let recipe = upgrade_parent_version(
            "org.springframework.boot",
            "spring-boot-starter-parent",
            "2.X",
            Some(r"^\d+\.\d+\.\d+$"),
            downloader,
            repos(),
        )
        .unwrap();

        let mut ctx = ExecutionContext::new();
        let doc = XmlDocument::parse(POM).unwrap();
        let out = recipe.run(doc, &mut ctx).unwrap();
        assert_eq!(parent_version(&out), Some("2.4.0"));
    }
}
