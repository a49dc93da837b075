//! Manufacturing Rules Engine
//!
//! Four pure checks over the rule tables, composed by `RulesEngine::evaluate`.
//! Checks produce messages; the status decides nothing about pricing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::operations::OperationList;
use crate::record::QuoteRecord;
use crate::tables::{MaterialRule, RuleTables};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleStatus {
    Ready,
    Valid,
    #[serde(rename = "Issues Found")]
    IssuesFound,
    Error,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Ready => "Ready",
            RuleStatus::Valid => "Valid",
            RuleStatus::IssuesFound => "Issues Found",
            RuleStatus::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThicknessCheck {
    pub valid: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceCheck {
    pub violations: Vec<String>,
    pub suggestions: Vec<String>,
}

impl SequenceCheck {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFlagKind {
    Cost,
    Redundant,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostFlag {
    #[serde(rename = "type")]
    pub kind: CostFlagKind,
    pub message: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    AddOperation,
    Reinforce,
    Caution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartSuggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

/// Context handed to each advisory cost rule.
pub struct CostContext<'a> {
    pub operations: &'a OperationList,
    pub material: &'a str,
    pub thickness: f64,
}

/// Advisory cost rule - produces at most one flag, never blocks a quote.
pub trait CostRule {
    fn name(&self) -> &'static str;
    fn check(&self, ctx: &CostContext<'_>) -> Option<CostFlag>;
}

pub struct ThickWeldRule;

impl CostRule for ThickWeldRule {
    fn name(&self) -> &'static str { "thick_weld" }

    fn check(&self, ctx: &CostContext<'_>) -> Option<CostFlag> {
        (ctx.operations.contains("Weld") && ctx.thickness > 0.125).then(|| CostFlag {
            kind: CostFlagKind::Cost,
            message: format!(
                "Welding thick {} ({}\") may be expensive",
                ctx.material, ctx.thickness
            ),
            suggestion: "Consider mechanical fasteners instead".to_string(),
        })
    }
}

pub struct DualFinishRule;

impl CostRule for DualFinishRule {
    fn name(&self) -> &'static str { "dual_finish" }

    fn check(&self, ctx: &CostContext<'_>) -> Option<CostFlag> {
        (ctx.operations.contains("Anodize") && ctx.operations.contains("Passivate")).then(|| CostFlag {
            kind: CostFlagKind::Redundant,
            message: "Both Anodize and Passivate selected - choose one finish".to_string(),
            suggestion: "Anodize for Aluminum, Passivate for Stainless Steel".to_string(),
        })
    }
}

pub struct LaserWithoutDeburrRule;

impl CostRule for LaserWithoutDeburrRule {
    fn name(&self) -> &'static str { "laser_without_deburr" }

    fn check(&self, ctx: &CostContext<'_>) -> Option<CostFlag> {
        (ctx.operations.contains("Laser") && !ctx.operations.contains("Deburr")).then(|| CostFlag {
            kind: CostFlagKind::Missing,
            message: "Deburr operation missing - may increase finishing costs".to_string(),
            suggestion: "Add Deburr after Laser for better finish".to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub status: RuleStatus,
    pub material_check: ThicknessCheck,
    pub violations: Vec<String>,
    pub suggestions: Vec<String>,
    pub cost_flags: Vec<String>,
    pub flags: Vec<CostFlag>,
    pub smart_suggestions: Vec<SmartSuggestion>,
    /// Table cost multiplier for each operation present, by name.
    pub multipliers: BTreeMap<String, f64>,
    pub diagnostics: Vec<String>,
}

/// Rules engine over a shared, immutable set of tables.
pub struct RulesEngine<'a> {
    tables: &'a RuleTables,
    cost_rules: Vec<Box<dyn CostRule>>,
}

impl<'a> RulesEngine<'a> {
    pub fn new(tables: &'a RuleTables) -> Self {
        Self {
            tables,
            cost_rules: vec![
                Box::new(ThickWeldRule),
                Box::new(DualFinishRule),
                Box::new(LaserWithoutDeburrRule),
            ],
        }
    }

    pub fn tables(&self) -> &RuleTables {
        self.tables
    }

    fn material_rule(&self, material: &str) -> Option<&'a MaterialRule> {
        self.tables.material(material)
    }

    pub fn validate_material_thickness(&self, material: &str, thickness: f64) -> ThicknessCheck {
        let Some(rule) = self.material_rule(material) else {
            return ThicknessCheck {
                valid: false,
                reason: format!("Unknown material: {material}"),
                suggestion: None,
            };
        };

        if rule.accepts_thickness(thickness) {
            return ThicknessCheck {
                valid: true,
                reason: "Valid combination".to_string(),
                suggestion: None,
            };
        }

        match rule.nearest_thickness(thickness) {
            Some(closest) => ThicknessCheck {
                valid: false,
                reason: format!(
                    "Thickness {thickness}\" not standard for {}. Closest: {closest}\"",
                    rule.code
                ),
                suggestion: Some(closest),
            },
            None => ThicknessCheck {
                valid: false,
                reason: format!("No standard thicknesses for {}", rule.code),
                suggestion: None,
            },
        }
    }

    pub fn validate_operation_sequence(
        &self,
        operations: &OperationList,
        material: &str,
        _thickness: f64,
    ) -> SequenceCheck {
        let mut check = SequenceCheck::default();
        let rule = self.material_rule(material);

        if let Some(rule) = rule {
            for row in operations.rows() {
                if let Some(restricted) = rule
                    .restricted_operations
                    .iter()
                    .find(|r| crate::operations::operation_matches(&row.operation, r))
                {
                    check
                        .violations
                        .push(format!("{restricted} not recommended for {}", rule.code));
                }
            }
        }

        for dep in &self.tables.dependencies {
            let Some(at) = operations.position_of(&dep.operation) else {
                continue;
            };
            for required in &dep.requires {
                let earlier = operations.position_of(required).map_or(false, |i| i < at);
                if !earlier {
                    check
                        .violations
                        .push(format!("{} should come after {}", dep.operation, required));
                }
            }
        }

        if let Some(rule) = rule {
            let missing = missing_preferred(rule, operations);
            if !missing.is_empty() {
                let first_two: Vec<&str> = missing.into_iter().take(2).collect();
                check
                    .suggestions
                    .push(format!("Consider adding: {}", first_two.join(", ")));
            }
        }

        check
    }

    pub fn get_cost_optimization_flags(
        &self,
        operations: &OperationList,
        material: &str,
        thickness: f64,
    ) -> Vec<CostFlag> {
        let Some(rule) = self.material_rule(material) else {
            return vec![];
        };
        let ctx = CostContext {
            operations,
            material: &rule.code,
            thickness,
        };
        self.cost_rules
            .iter()
            .filter_map(|r| {
                let flag = r.check(&ctx);
                if flag.is_some() {
                    tracing::debug!(rule = r.name(), "cost flag raised");
                }
                flag
            })
            .collect()
    }

    pub fn get_smart_suggestions(
        &self,
        material: &str,
        thickness: f64,
        operations: &OperationList,
    ) -> Vec<SmartSuggestion> {
        let Some(rule) = self.material_rule(material) else {
            return vec![];
        };
        let mut suggestions = vec![];

        if let Some(first) = missing_preferred(rule, operations).first() {
            suggestions.push(SmartSuggestion {
                kind: SuggestionKind::AddOperation,
                message: format!("Add {first} for optimal {} processing", rule.code),
                operation: Some(first.to_string()),
            });
        }

        let has_form = operations.contains("Form");
        if thickness >= 0.250 && has_form && !operations.contains("Weld") {
            suggestions.push(SmartSuggestion {
                kind: SuggestionKind::Reinforce,
                message: format!("Thick {} ({thickness}\") may need reinforcement", rule.code),
                operation: Some("Weld".to_string()),
            });
        }

        if thickness <= 0.063 && has_form {
            suggestions.push(SmartSuggestion {
                kind: SuggestionKind::Caution,
                message: format!(
                    "Thin {} ({thickness}\") forming may be challenging. Consider increasing thickness or reducing bend angles",
                    rule.code
                ),
                operation: None,
            });
        }

        suggestions
    }

    /// Advisory messages for thickness outside the shop's working range.
    pub fn thickness_advisories(&self, thickness: f64) -> Vec<String> {
        let bounds = &self.tables.thickness_bounds;
        let mut out = vec![];
        if thickness < bounds.min {
            out.push(format!(
                "Thickness {thickness}\" is below the shop minimum of {}\"",
                bounds.min
            ));
        } else if thickness > bounds.max {
            out.push(format!(
                "Thickness {thickness}\" exceeds the shop maximum of {}\"",
                bounds.max
            ));
        } else if thickness >= bounds.warning_threshold {
            out.push(format!(
                "Thickness {thickness}\" may need special handling (>= {}\")",
                bounds.warning_threshold
            ));
        }
        out
    }

    /// Runs every check for the record and operation list.
    pub fn evaluate(&self, record: &QuoteRecord, operations: &OperationList) -> RuleEvaluation {
        #[cfg(feature = "test-hooks")]
        crate::pipeline::record_evaluation();

        let material = record.material.as_deref().map(str::trim).filter(|m| !m.is_empty());
        let thickness = record.thickness_in;

        if let Some(t) = thickness.filter(|t| !t.is_finite()) {
            tracing::warn!(thickness = t, "non-finite thickness, rules not evaluated");
            return RuleEvaluation {
                status: RuleStatus::Error,
                material_check: ThicknessCheck {
                    valid: false,
                    reason: "Thickness is not a number".to_string(),
                    suggestion: None,
                },
                violations: vec![format!("Rules engine error: invalid thickness {t}")],
                suggestions: vec![],
                cost_flags: vec![],
                flags: vec![],
                smart_suggestions: vec![],
                multipliers: BTreeMap::new(),
                diagnostics: vec![format!("invalid thickness {t}")],
            };
        }

        let material_name = material.unwrap_or("");
        let thickness_value = thickness.unwrap_or(0.0);

        let (material_check, complete) = match (material, thickness) {
            (Some(m), Some(t)) => (self.validate_material_thickness(m, t), true),
            _ => (
                ThicknessCheck {
                    valid: true,
                    reason: "No material/thickness set".to_string(),
                    suggestion: None,
                },
                false,
            ),
        };

        let sequence = if operations.is_empty() {
            SequenceCheck::default()
        } else {
            self.validate_operation_sequence(operations, material_name, thickness_value)
        };

        let flags = if operations.is_empty() || !complete {
            vec![]
        } else {
            self.get_cost_optimization_flags(operations, material_name, thickness_value)
        };

        let smart = if complete {
            self.get_smart_suggestions(material_name, thickness_value, operations)
        } else {
            vec![]
        };

        let mut suggestions = sequence.suggestions.clone();
        suggestions.extend(smart.iter().map(|s| s.message.clone()));
        if complete {
            suggestions.extend(self.thickness_advisories(thickness_value));
        }

        let multipliers = match material {
            Some(m) => operations
                .rows()
                .iter()
                .filter(|r| !r.name().is_empty())
                .map(|r| (r.name().to_string(), self.tables.cost_multiplier(m, r.name())))
                .collect(),
            None => BTreeMap::new(),
        };

        let status = if !sequence.is_valid() {
            RuleStatus::IssuesFound
        } else if !complete {
            RuleStatus::Ready
        } else if material_check.valid {
            RuleStatus::Valid
        } else {
            RuleStatus::IssuesFound
        };

        tracing::debug!(
            status = status.as_str(),
            violations = sequence.violations.len(),
            flags = flags.len(),
            "evaluated manufacturing rules"
        );

        RuleEvaluation {
            status,
            material_check,
            violations: sequence.violations,
            suggestions,
            cost_flags: flags.iter().map(|f| f.message.clone()).collect(),
            flags,
            smart_suggestions: smart,
            multipliers,
            diagnostics: vec![],
        }
    }
}

fn missing_preferred<'r>(rule: &'r MaterialRule, operations: &OperationList) -> Vec<&'r str> {
    rule.preferred_operations
        .iter()
        .filter(|op| !operations.contains(op))
        .map(String::as_str)
        .collect()
}
