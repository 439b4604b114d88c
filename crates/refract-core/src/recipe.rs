//! Recipes: named, validated units of transformation.
//!
//! A recipe produces a visitor and drives it to fixpoint over a document;
//! follow-up visitors scheduled during the traversal are drained afterward
//! in insertion order. Recipes chain with [`Recipe::do_next`], and a recipe
//! assembled from others (declarative or via `do_next`) simply runs its
//! list in order.

use std::sync::Arc;

use refract_util::errors::RefractError;

use crate::execution::ExecutionContext;
use crate::tree::XmlDocument;
use crate::visitor::TreeVisitor;

/// Upper bound on visit/fixpoint cycles for a single recipe.
const MAX_CYCLES: usize = 10;

/// Upper bound on follow-up visitors drained in one recipe run. Exceeding
/// it means a visitor keeps rescheduling itself.
const MAX_SCHEDULED_VISITORS: usize = 1_000;

type VisitorFactory = Arc<dyn Fn() -> TreeVisitor + Send + Sync>;

/// A named transformation over the tag tree.
#[derive(Clone)]
pub struct Recipe {
    name: String,
    display_name: String,
    description: String,
    visitor: Option<VisitorFactory>,
    next: Vec<Recipe>,
    validation_error: Option<String>,
}

impl Recipe {
    /// A leaf recipe backed by a visitor factory.
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        visitor: impl Fn() -> TreeVisitor + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            visitor: Some(Arc::new(visitor)),
            next: Vec::new(),
            validation_error: None,
        }
    }

    /// A recipe that only runs other recipes, in order.
    pub fn composite(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        recipes: Vec<Recipe>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            visitor: None,
            next: recipes,
            validation_error: None,
        }
    }

    /// A placeholder for a recipe that failed validation. It keeps its name
    /// so the failure can be reported, but refuses to run.
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            description: String::new(),
            visitor: None,
            next: Vec::new(),
            validation_error: Some(message.into()),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Chain another recipe to run after this one.
    pub fn do_next(mut self, other: Recipe) -> Self {
        self.next.push(other);
        self
    }

    /// Check this recipe and everything it chains to.
    pub fn validate(&self) -> miette::Result<()> {
        if let Some(message) = &self.validation_error {
            return Err(RefractError::RecipeValidation {
                message: format!("{}: {}", self.name, message),
            }
            .into());
        }
        for recipe in &self.next {
            recipe.validate()?;
        }
        Ok(())
    }

    /// Run this recipe's visitor to fixpoint, then each chained recipe.
    pub fn run(
        &self,
        doc: XmlDocument,
        ctx: &mut ExecutionContext,
    ) -> miette::Result<XmlDocument> {
        self.validate()?;
        let mut doc = doc;
        if let Some(factory) = &self.visitor {
            doc = run_to_fixpoint(&factory(), doc, ctx)?;
        }
        for recipe in &self.next {
            doc = recipe.run(doc, ctx)?;
        }
        Ok(doc)
    }
}

impl std::fmt::Debug for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

/// Drive one visitor until the document stops changing, draining scheduled
/// follow-ups after every traversal.
fn run_to_fixpoint(
    visitor: &TreeVisitor,
    mut doc: XmlDocument,
    ctx: &mut ExecutionContext,
) -> miette::Result<XmlDocument> {
    for _ in 0..MAX_CYCLES {
        let before = doc.clone();
        doc = visitor.visit(doc, ctx)?;
        doc = drain_after_visit(doc, ctx)?;
        if doc == before {
            return Ok(doc);
        }
    }
    Err(RefractError::Generic {
        message: format!("visitor did not converge after {MAX_CYCLES} cycles"),
    }
    .into())
}

/// Run scheduled follow-up visitors in insertion order. Each drained
/// visitor may enqueue further followers; the total is bounded.
fn drain_after_visit(
    mut doc: XmlDocument,
    ctx: &mut ExecutionContext,
) -> miette::Result<XmlDocument> {
    let mut drained = 0usize;
    while ctx.has_after_visit() {
        for follower in ctx.take_after_visit() {
            drained += 1;
            if drained > MAX_SCHEDULED_VISITORS {
                return Err(RefractError::Generic {
                    message: format!(
                        "runaway visitor schedule: more than {MAX_SCHEDULED_VISITORS} follow-ups"
                    ),
                }
                .into());
            }
            doc = follower.visit(doc, ctx)?;
        }
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visitor::change_tag_value;

    fn parse(xml: &str) -> XmlDocument {
        XmlDocument::parse(xml).unwrap()
    }

    fn rename_recipe(from: &'static str, to: &'static str) -> Recipe {
        Recipe::new("test.rename", "Rename", "", move || {
            TreeVisitor::for_tags(move |mut tag, _, _| {
                if tag.value.as_deref() == Some(from) {
                    tag.value = Some(to.to_string());
                }
                Ok(tag)
            })
        })
    }

    #[test]
    fn run_reaches_fixpoint() {
        let mut ctx = ExecutionContext::new();
        let doc = parse("<project><name>old</name></project>");
        let out = rename_recipe("old", "new").run(doc, &mut ctx).unwrap();
        assert_eq!(out.root.child_value("name"), Some("new"));
    }

    #[test]
    fn rerunning_on_own_output_is_noop() {
        let mut ctx = ExecutionContext::new();
        let recipe = rename_recipe("old", "new");
        let doc = parse("<project><name>old</name></project>");
        let once = recipe.run(doc, &mut ctx).unwrap();
        let twice = recipe.run(once.clone(), &mut ctx).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn chained_recipes_run_in_order() {
        let mut ctx = ExecutionContext::new();
        let recipe = rename_recipe("a", "b").do_next(rename_recipe("b", "c"));
        let doc = parse("<project><name>a</name></project>");
        let out = recipe.run(doc, &mut ctx).unwrap();
        assert_eq!(out.root.child_value("name"), Some("c"));
    }

    #[test]
    fn follow_up_visitor_runs_after_traversal() {
        let mut ctx = ExecutionContext::new();
        let recipe = Recipe::new("test.schedule", "Schedule", "", || {
            TreeVisitor::for_tags(|tag, cursor, ctx| {
                if tag.name == "version" && cursor.path_string() == "project" {
                    ctx.do_after_visit(change_tag_value("project", "version", "1.0", "2.0"));
                }
                Ok(tag)
            })
        });
        let doc = parse("<project><version>1.0</version></project>");
        let out = recipe.run(doc, &mut ctx).unwrap();
        assert_eq!(out.root.child_value("version"), Some("2.0"));
    }

    #[test]
    fn invalid_recipe_refuses_to_run() {
        let mut ctx = ExecutionContext::new();
        let recipe = Recipe::invalid("broken", "references unknown recipe 'x'");
        assert!(recipe.validate().is_err());
        let doc = parse("<project/>");
        assert!(recipe.run(doc, &mut ctx).is_err());
    }

    #[test]
    fn invalid_recipe_in_chain_fails_validation() {
        let recipe = rename_recipe("a", "b").do_next(Recipe::invalid("broken", "nope"));
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn runaway_schedule_is_detected() {
        let mut ctx = ExecutionContext::new();

        fn reschedule() -> TreeVisitor {
            TreeVisitor::for_document(|doc, ctx| {
                ctx.do_after_visit(reschedule());
                Ok(doc)
            })
        }

        let recipe = Recipe::new("test.runaway", "Runaway", "", reschedule);
        let doc = parse("<project/>");
        let err = recipe.run(doc, &mut ctx).unwrap_err();
        assert!(format!("{err}").contains("runaway"));
    }
}
