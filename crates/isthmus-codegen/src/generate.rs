//! Artifact generation: plan an item, render both sides, pair them up.

use tracing::debug;

use isthmus_catalog::TypeCatalog;
use isthmus_core::{CompatibilityEdge, DeclaredConstant, DeclaredType, Finding, Side};
use isthmus_verify::CheckedSignature;

use crate::artifact::{ArtifactPair, GlueArtifact};
use crate::error::Result;
use crate::plan::{
    plan_constant, plan_function, plan_type, CodegenConfig, ConstantPlan, FunctionPlan, GluePlan,
    TypePlan,
};
use crate::{render_a, render_b};

/// Render the caller and callee glue of a function. Both artifacts come
/// from one plan.
pub fn render_function_pair(plan: &FunctionPlan) -> ArtifactPair {
    let direction = Some(plan.direction);
    let pair = ArtifactPair {
        a: GlueArtifact::new(
            plan.item.clone(),
            Side::A,
            direction,
            render_a::render_function(plan),
        ),
        b: GlueArtifact::new(
            plan.item.clone(),
            Side::B,
            direction,
            render_b::render_function(plan),
        ),
    };
    debug!(
        item = %plan.item,
        a = %pair.a.fingerprint,
        b = %pair.b.fingerprint,
        "rendered function glue"
    );
    pair
}

pub fn render_constant_pair(plan: &ConstantPlan) -> ArtifactPair {
    ArtifactPair {
        a: GlueArtifact::new(
            plan.item.clone(),
            Side::A,
            None,
            render_a::render_constant(plan),
        ),
        b: GlueArtifact::new(
            plan.item.clone(),
            Side::B,
            None,
            render_b::render_constant(plan),
        ),
    }
}

pub fn render_type_pair(plan: &TypePlan) -> ArtifactPair {
    ArtifactPair {
        a: GlueArtifact::new(plan.item.clone(), Side::A, None, render_a::render_type(plan)),
        b: GlueArtifact::new(plan.item.clone(), Side::B, None, render_b::render_type(plan)),
    }
}

pub fn render_pair(plan: &GluePlan) -> ArtifactPair {
    match plan {
        GluePlan::Function(p) => render_function_pair(p),
        GluePlan::Constant(p) => render_constant_pair(p),
        GluePlan::Type(p) => render_type_pair(p),
    }
}

/// Generate the glue pair for a verified function. A rejected finding
/// produces no artifacts.
pub fn generate_function(
    catalog: &TypeCatalog,
    sig: &CheckedSignature,
    finding: &Finding,
    config: &CodegenConfig,
) -> Result<ArtifactPair> {
    let plan = plan_function(catalog, sig, finding, config)?;
    Ok(render_function_pair(&plan))
}

pub fn generate_constant(
    catalog: &TypeCatalog,
    constant: &DeclaredConstant,
    edge: &CompatibilityEdge,
    config: &CodegenConfig,
) -> ArtifactPair {
    render_constant_pair(&plan_constant(catalog, constant, edge, config))
}

pub fn generate_type(
    catalog: &TypeCatalog,
    ty: &DeclaredType,
    config: &CodegenConfig,
) -> Result<ArtifactPair> {
    let plan = plan_type(catalog, ty, config)?;
    Ok(render_type_pair(&plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture;
    use isthmus_core::{Direction, ItemKind};

    #[test]
    fn function_pair_shares_item_and_direction() {
        let f = fixture();
        let pair = generate_function(
            &f.catalog,
            &f.signature("sum"),
            &f.finding("sum"),
            &f.config,
        )
        .unwrap();
        assert_eq!(pair.a.item, pair.b.item);
        assert_eq!(pair.a.side, Side::A);
        assert_eq!(pair.b.side, Side::B);
        assert_eq!(pair.a.direction, Some(Direction::AToB));
        assert!(pair.a.source.contains("isthmus_sum"));
        assert!(pair.b.source.contains("isthmus_sum"));
        assert_ne!(pair.a.fingerprint, pair.b.fingerprint);
    }

    #[test]
    fn rendering_is_deterministic() {
        let f = fixture();
        let first = render_function_pair(&f.function_plan("translate"));
        let second = render_function_pair(&f.function_plan("translate"));
        assert_eq!(first, second);
    }

    #[test]
    fn rejected_findings_generate_nothing() {
        let f = fixture();
        let rejected = Finding::Rejected("no".to_string());
        assert!(generate_function(&f.catalog, &f.signature("sum"), &rejected, &f.config).is_err());
    }

    #[test]
    fn types_and_constants_have_no_direction() {
        let f = fixture();
        let ty = f
            .catalog
            .get(Side::A, &isthmus_core::QualifiedName::new("Point"))
            .unwrap();
        let pair = generate_type(&f.catalog, ty, &f.config).unwrap();
        assert_eq!(pair.a.item.kind, ItemKind::Type);
        assert_eq!(pair.a.direction, None);

        let pair = render_pair(&GluePlan::Constant(f.constant_plan("MAX_PORTS")));
        assert!(pair.b.source.contains("ISTHMUS_MAX_PORTS"));
        assert!(pair.a.source.contains("MAX_PORTS"));
    }
}
