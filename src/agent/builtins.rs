//! Built-in agent roster
//!
//! Thirteen specialists in six divisions. Their domain tooling is external; the
//! built-in `analyze` asks the provider router for an investigation-grade
//! reading of the payload and wraps the answer with bookkeeping fields.

use super::{AgentProfile, AnalysisContext, Capabilities, Specialist};
use crate::provider::{ProviderRouter, QueryCategory, QueryContext};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Static description of one built-in agent
#[derive(Debug, Clone)]
pub struct BuiltinDefinition {
    pub profile: AgentProfile,
    pub supported_tasks: Vec<String>,
    /// Focus statement used in the agent's system prompt
    pub focus: String,
}

#[allow(clippy::too_many_arguments)]
fn define(
    codename: &str,
    name: &str,
    specialization: &str,
    division: &str,
    tools: &[&str],
    ai_backends: &[&str],
    supported_tasks: &[&str],
    focus: Option<&str>,
) -> BuiltinDefinition {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    BuiltinDefinition {
        profile: AgentProfile {
            name: name.to_string(),
            codename: codename.to_string(),
            specialization: specialization.to_string(),
            tools: strings(tools),
            ai_backends: strings(ai_backends),
            division: division.to_string(),
        },
        supported_tasks: strings(supported_tasks),
        focus: focus.unwrap_or(specialization).to_string(),
    }
}

const SOCIAL: &str = "Social Media Intelligence";
const FORENSICS: &str = "Digital Forensics";
const GEO: &str = "Geolocation Intelligence";
const IDENTITY: &str = "Identity Resolution";
const LINK: &str = "Link Analysis";
const VEHICLE: &str = "Vehicle Analysis";

/// The built-in roster, in division order
pub fn builtin_profiles() -> Vec<BuiltinDefinition> {
    vec![
        define(
            "ARGUS",
            "ARGUS - All-Seeing Eye",
            "Social Media Reconnaissance",
            SOCIAL,
            &[
                "tweepy", "instaloader", "facebook-scraper", "tiktok-scraper", "selenium",
                "scrapy", "social-analyzer", "sherlock", "linkedin-api", "reddit-praw",
                "discord-py", "telegram-scraper",
            ],
            &["claude", "chatgpt", "local"],
            &[
                "social_media_search", "profile_analysis", "content_monitoring", "user_tracking",
                "content_analysis", "evidence_collection", "pattern_recognition",
                "real_time_monitoring",
            ],
            Some(
                "Social Media Reconnaissance - monitoring platforms for missing person traces \
                 and trafficking indicators",
            ),
        ),
        define(
            "HYDRA",
            "HYDRA - Multi-Head Analysis",
            "Cross-Platform Correlation",
            SOCIAL,
            &["maltego", "gephi", "spiderfoot", "correlation-engine"],
            &["claude", "chatgpt", "gemini"],
            &["cross_platform_correlation", "data_fusion", "pattern_matching"],
            Some(
                "Cross-platform correlation - connecting dots between different data sources \
                 and platforms",
            ),
        ),
        define(
            "KRONOS",
            "KRONOS - Timeline Master",
            "Temporal Analysis",
            SOCIAL,
            &["timeline-analysis", "temporal-correlation", "event-reconstruction"],
            &["claude", "chatgpt"],
            &["timeline_reconstruction", "temporal_analysis", "event_correlation"],
            None,
        ),
        define(
            "CERBERUS",
            "CERBERUS - Guardian Analyst",
            "Digital Evidence Analysis",
            FORENSICS,
            &["autopsy", "volatility", "binwalk", "exiftool"],
            &["claude", "local"],
            &["evidence_analysis", "file_forensics", "metadata_extraction"],
            None,
        ),
        define(
            "PHOENIX",
            "PHOENIX - Data Recovery",
            "Deleted Data Recovery",
            FORENSICS,
            &["photorec", "testdisk", "scalpel", "foremost"],
            &["claude", "local"],
            &["data_recovery", "file_carving", "deleted_file_analysis"],
            None,
        ),
        define(
            "ATLAS",
            "ATLAS - World Mapper",
            "Location Intelligence and Geographic Analysis",
            GEO,
            &[
                "folium", "geopy", "reverse-geocoder", "exifread", "GPS-analysis",
                "movement-tracking", "route-optimization", "geographic-clustering",
                "location-correlation", "satellite-imagery", "street-view-api",
            ],
            &["claude", "chatgpt", "gemini"],
            &[
                "location_extraction", "movement_analysis", "route_tracking",
                "geographic_correlation", "image_geolocation", "travel_pattern_analysis",
                "location_clustering", "risk_assessment", "mapping_visualization",
            ],
            Some(
                "Location intelligence and geospatial analysis for tracking movement and \
                 identifying locations",
            ),
        ),
        define(
            "SENTINEL",
            "SENTINEL - Area Monitor",
            "Surveillance Analysis",
            GEO,
            &["opencv", "facial-detection", "movement-tracking", "cctv-analysis"],
            &["claude", "local"],
            &["surveillance_analysis", "area_monitoring", "movement_detection"],
            None,
        ),
        define(
            "ORACLE",
            "ORACLE - Identity Expert",
            "Person Identification and Verification",
            IDENTITY,
            &[
                "face-recognition", "opencv", "sklearn", "PIL", "PimEyes-API", "FaceCheck-API",
                "TinEye-API", "biometric-analysis", "identity-clustering",
                "reverse-image-search", "facial-landmarks",
            ],
            &["claude", "chatgpt", "gemini"],
            &[
                "facial_recognition", "identity_verification", "profile_consolidation",
                "biometric_analysis", "reverse_image_search", "identity_clustering",
                "anonymous_resolution", "face_comparison", "age_estimation",
                "demographic_analysis",
            ],
            Some(
                "Person identification through facial recognition, profile matching, and \
                 identity verification",
            ),
        ),
        define(
            "SPHINX",
            "SPHINX - Riddle Solver",
            "Anonymous Identity Resolution",
            IDENTITY,
            &["username-analysis", "writing-style-analysis", "behavioral-profiling"],
            &["claude", "chatgpt", "gemini"],
            &["anonymous_analysis", "identity_resolution", "behavioral_profiling"],
            None,
        ),
        define(
            "NETWORK",
            "NETWORK - Connection Mapper",
            "Relationship Analysis",
            LINK,
            &["maltego", "gephi", "networkx", "social-network-analysis"],
            &["claude", "chatgpt"],
            &["relationship_mapping", "network_analysis", "connection_discovery"],
            Some(
                "Relationship analysis and social network mapping to identify associates and \
                 connections",
            ),
        ),
        define(
            "GRAPH",
            "GRAPH - Visual Analyst",
            "Network Visualization",
            LINK,
            &["d3js", "cytoscape", "plotly", "matplotlib"],
            &["claude", "local"],
            &["data_visualization", "network_graphs", "pattern_visualization"],
            None,
        ),
        define(
            "MOTOR",
            "MOTOR - Vehicle Expert",
            "Vehicle Intelligence",
            VEHICLE,
            &["license-plate-recognition", "vin-decoder", "vehicle-database"],
            &["claude", "chatgpt"],
            &["vehicle_analysis", "license_plate_lookup", "vehicle_identification"],
            None,
        ),
        define(
            "TRACE",
            "TRACE - Movement Tracker",
            "Vehicle Tracking",
            VEHICLE,
            &["gps-analysis", "traffic-cam-integration", "route-optimization"],
            &["claude", "local"],
            &["movement_tracking", "route_analysis", "location_prediction"],
            None,
        ),
    ]
}

/// System prompt shared by every investigation agent
pub fn investigation_prompt(agent_name: &str, focus: &str) -> String {
    format!(
        "You are {agent_name}, a specialized AI agent in the Obsidian Council investigation framework.

Your specialization: {focus}

You are part of a critical investigation focusing on missing persons and human trafficking cases. Your analysis must be:
- Accurate and evidence-based
- Legally compliant and court-admissible
- Sensitive to victims and their families
- Focused on actionable intelligence

When analyzing data:
1. Verify information through multiple sources when possible
2. Clearly distinguish between facts and inference
3. Highlight time-sensitive information that requires immediate action
4. Identify patterns that may indicate trafficking or abduction
5. Respect privacy laws and ethical boundaries

Format your responses with clear sections:
- SUMMARY: Key findings in 2-3 sentences
- ANALYSIS: Detailed analysis with confidence levels
- ACTIONABLE INTELLIGENCE: Specific next steps
- CONCERNS: Any red flags or urgent indicators
- RECOMMENDATIONS: Suggested follow-up actions
"
    )
}

/// AI-assisted specialist used for every built-in codename
pub struct BuiltinSpecialist {
    profile: AgentProfile,
    supported_tasks: Vec<String>,
    system_prompt: String,
    router: Arc<ProviderRouter>,
}

impl BuiltinSpecialist {
    pub fn new(definition: BuiltinDefinition, router: Arc<ProviderRouter>) -> Self {
        let system_prompt = investigation_prompt(&definition.profile.name, &definition.focus);
        Self {
            profile: definition.profile,
            supported_tasks: definition.supported_tasks,
            system_prompt,
            router,
        }
    }

    fn render_prompt(&self, task_type: &str, payload: &Value, ctx: &AnalysisContext) -> String {
        let data = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        let mut prompt = format!("Task: {}\n", task_type);
        if let Some(case_id) = &ctx.case_id {
            prompt.push_str(&format!("Case: {}\n", case_id));
        }
        if let Some(requester) = &ctx.requester {
            prompt.push_str(&format!("Requested by: {}\n", requester));
        }
        prompt.push_str(&format!(
            "\nData:\n{}\n\nAnalyze this data within your specialization ({}).",
            data, self.profile.specialization
        ));
        prompt
    }
}

#[async_trait]
impl Specialist for BuiltinSpecialist {
    fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(self.supported_tasks.clone()).with_details(json!({
            "tools": self.profile.tools,
            "aiBackends": self.profile.ai_backends,
            "division": self.profile.division,
        }))
    }

    async fn analyze(&self, payload: Value, ctx: AnalysisContext) -> anyhow::Result<Value> {
        let Value::Object(fields) = &payload else {
            anyhow::bail!("{} expects a JSON object payload", self.profile.codename);
        };

        let task_type = ctx.task_type.clone().unwrap_or_else(|| {
            if ctx.collaboration {
                "collaboration".to_string()
            } else {
                "analysis".to_string()
            }
        });
        let prompt = self.render_prompt(&task_type, &payload, &ctx);

        let mut query = QueryContext::new(&self.profile.name, QueryCategory::Investigation)
            .with_specialization(&self.profile.specialization);
        if let Some(case_id) = &ctx.case_id {
            query = query.with_case(case_id);
        }
        if let Some(preferred) = self.profile.ai_backends.first() {
            query = query.with_preferred_provider(preferred);
        }

        let mut result = Map::new();
        result.insert("agent".into(), json!(self.profile.codename));
        result.insert("taskType".into(), json!(task_type));
        result.insert("caseId".into(), json!(ctx.case_id));
        result.insert("collaboration".into(), json!(ctx.collaboration));
        result.insert(
            "inputFields".into(),
            json!(fields.keys().collect::<Vec<_>>()),
        );

        match self
            .router
            .route_query(&prompt, &query, Some(&self.system_prompt), true)
            .await
        {
            Ok(response) => {
                result.insert("aiAnalysis".into(), json!(response.content));
                result.insert("aiProvider".into(), json!(response.provider));
                result.insert("aiConfidence".into(), json!(response.confidence));
                result.insert("aiCost".into(), json!(response.cost));
            }
            Err(e) => {
                tracing::warn!(agent = %self.profile.codename, error = %e, "AI analysis failed");
                result.insert("aiAnalysis".into(), json!(format!("AI analysis failed: {}", e)));
                result.insert("aiConfidence".into(), json!(0.0));
            }
        }
        result.insert("timestamp".into(), json!(Utc::now()));
        Ok(Value::Object(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RoutingTable;
    use crate::test_support::{call_log, ScriptedProvider};
    use std::collections::{BTreeMap, HashSet};

    fn atlas(router: Arc<ProviderRouter>) -> BuiltinSpecialist {
        let definition = builtin_profiles()
            .into_iter()
            .find(|d| d.profile.codename == "ATLAS")
            .unwrap();
        BuiltinSpecialist::new(definition, router)
    }

    #[test]
    fn test_roster_shape() {
        let roster = builtin_profiles();
        assert_eq!(roster.len(), 13);

        let mut divisions: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for d in &roster {
            divisions
                .entry(d.profile.division.as_str())
                .or_default()
                .push(d.profile.codename.as_str());
            assert!(!d.supported_tasks.is_empty());
            assert!(!d.profile.ai_backends.is_empty());
        }
        assert_eq!(divisions.len(), 6);
        assert_eq!(divisions[SOCIAL], vec!["ARGUS", "HYDRA", "KRONOS"]);
        assert_eq!(divisions[VEHICLE], vec!["MOTOR", "TRACE"]);

        let codenames: HashSet<_> = roster.iter().map(|d| d.profile.codename.clone()).collect();
        assert_eq!(codenames.len(), 13);
    }

    #[test]
    fn test_prompt_names_agent_and_focus() {
        let prompt = investigation_prompt("ORACLE - Identity Expert", "Person identification");
        assert!(prompt.starts_with("You are ORACLE - Identity Expert"));
        assert!(prompt.contains("Your specialization: Person identification"));
        assert!(prompt.contains("RECOMMENDATIONS"));
    }

    #[tokio::test]
    async fn test_analysis_uses_first_backend() {
        let log = call_log();
        let router = ProviderRouter::new(RoutingTable::default())
            .with_provider(ScriptedProvider::ok("claude", 0.9, &log))
            .with_provider(ScriptedProvider::ok("chatgpt", 0.85, &log));
        router.set_health("claude", true);
        router.set_health("chatgpt", true);
        let specialist = atlas(Arc::new(router));

        let ctx = AnalysisContext {
            case_id: Some("CASE-3".to_string()),
            task_type: Some("route_tracking".to_string()),
            ..Default::default()
        };
        let result = specialist.analyze(json!({"gps": [1.0, 2.0]}), ctx).await.unwrap();

        assert_eq!(result["aiProvider"], "claude");
        assert_eq!(result["taskType"], "route_tracking");
        assert_eq!(result["caseId"], "CASE-3");
        assert_eq!(result["inputFields"], json!(["gps"]));
        assert!(result["aiAnalysis"].as_str().unwrap().contains("route_tracking"));
        assert_eq!(*log.lock(), vec!["claude".to_string()]);
    }

    #[tokio::test]
    async fn test_routing_failure_is_recorded_not_raised() {
        let router = ProviderRouter::new(RoutingTable::default());
        let specialist = atlas(Arc::new(router));

        let result = specialist
            .analyze(json!({"photo": "x.jpg"}), AnalysisContext::collaboration("ORACLE"))
            .await
            .unwrap();

        assert_eq!(result["aiConfidence"], 0.0);
        assert_eq!(result["collaboration"], true);
        assert_eq!(result["taskType"], "collaboration");
        assert!(result["aiAnalysis"]
            .as_str()
            .unwrap()
            .starts_with("AI analysis failed: No healthy AI providers"));
    }

    #[tokio::test]
    async fn test_non_object_payload_fails() {
        let specialist = atlas(Arc::new(ProviderRouter::new(RoutingTable::default())));
        let err = specialist
            .analyze(json!("just a string"), AnalysisContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expects a JSON object"));
    }
}
