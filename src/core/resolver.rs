use crate::core::polyline;
use crate::domain::model::{Coordinate, PathSource, ResolvedPath, RouteView};
use crate::domain::ports::{DirectionsProvider, DirectionsRequest, Waypoint};
use crate::utils::error::{Result, TrackerError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One rung of the fallback ladder, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStep {
    ProviderRouteEndpoints,
    ProviderStageEndpoints,
    ProviderPlaceLabels,
    StoredGeometry,
    StageChain,
}

impl fmt::Display for ResolutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolutionStep::ProviderRouteEndpoints => "provider (route endpoints)",
            ResolutionStep::ProviderStageEndpoints => "provider (stage endpoints)",
            ResolutionStep::ProviderPlaceLabels => "provider (place labels)",
            ResolutionStep::StoredGeometry => "stored geometry",
            ResolutionStep::StageChain => "stage chain",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Resolved(usize),
    Empty,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub step: ResolutionStep,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Resolved(n) => write!(f, "{}: resolved {} points", self.step, n),
            AttemptOutcome::Empty => write!(f, "{}: no points", self.step),
            AttemptOutcome::Skipped(reason) => write!(f, "{}: skipped ({})", self.step, reason),
            AttemptOutcome::Failed(reason) => write!(f, "{}: failed ({})", self.step, reason),
        }
    }
}

/// The chosen path plus what every attempted step did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub path: ResolvedPath,
    pub attempts: Vec<Attempt>,
}

impl Resolution {
    pub fn attempt(&self, step: ResolutionStep) -> Option<&Attempt> {
        self.attempts.iter().find(|attempt| attempt.step == step)
    }

    pub fn into_required(self, route_id: &str) -> Result<ResolvedPath> {
        if self.path.is_empty() {
            return Err(TrackerError::GeometryExhausted {
                route_id: route_id.to_string(),
                attempts: self.attempts.iter().map(ToString::to_string).collect(),
            });
        }
        Ok(self.path)
    }
}

/// Outcome of the provider phase: either a path, or keep descending.
enum ProviderPhase {
    Resolved(Vec<Coordinate>),
    Continue,
    /// Transport failure: no further provider calls are worth making.
    Unreachable,
}

/// Picks the most accurate geometry available for a route.
pub struct GeometryResolver<P: DirectionsProvider> {
    provider: Arc<P>,
}

impl<P: DirectionsProvider> Clone for GeometryResolver<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: DirectionsProvider> GeometryResolver<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// One provider call, decoded. Errors are returned, not swallowed.
    pub async fn fetch_provider_path(&self, request: &DirectionsRequest) -> Result<Vec<Coordinate>> {
        let encoded = self.provider.directions(request).await?;
        polyline::decode(&encoded)
    }

    pub async fn resolve(&self, view: &RouteView) -> ResolvedPath {
        self.resolve_detailed(view).await.path
    }

    /// Fails with `GeometryExhausted` when no source produced a point.
    pub async fn require(&self, view: &RouteView) -> Result<ResolvedPath> {
        self.resolve_detailed(view).await.into_required(view.id())
    }

    pub async fn resolve_detailed(&self, view: &RouteView) -> Resolution {
        let mut attempts = Vec::new();

        if let Some(points) = self.provider_phase(view, &mut attempts).await {
            return Resolution {
                path: ResolvedPath::new(PathSource::Provider, points),
                attempts,
            };
        }

        if view.stored_path.is_empty() {
            attempts.push(Attempt {
                step: ResolutionStep::StoredGeometry,
                outcome: AttemptOutcome::Empty,
            });
        } else {
            attempts.push(Attempt {
                step: ResolutionStep::StoredGeometry,
                outcome: AttemptOutcome::Resolved(view.stored_path.len()),
            });
            tracing::info!(
                route_id = %view.id(),
                points = view.stored_path.len(),
                "Using stored route geometry"
            );
            return Resolution {
                path: ResolvedPath::new(PathSource::StoredGeometry, view.stored_path.clone()),
                attempts,
            };
        }

        let chain = ResolvedPath::new(PathSource::StageChain, view.stage_coordinates());
        if chain.len() >= 2 {
            attempts.push(Attempt {
                step: ResolutionStep::StageChain,
                outcome: AttemptOutcome::Resolved(chain.len()),
            });
            tracing::info!(
                route_id = %view.id(),
                stages = chain.len(),
                "Using straight-line stage chain"
            );
            return Resolution {
                path: chain,
                attempts,
            };
        }
        attempts.push(Attempt {
            step: ResolutionStep::StageChain,
            outcome: AttemptOutcome::Skipped(format!(
                "{} distinct stage location(s), need at least 2",
                chain.len()
            )),
        });

        tracing::warn!(route_id = %view.id(), "No geometry source available, basic route only");
        Resolution {
            path: ResolvedPath::none(),
            attempts,
        }
    }

    async fn provider_phase(
        &self,
        view: &RouteView,
        attempts: &mut Vec<Attempt>,
    ) -> Option<Vec<Coordinate>> {
        let candidates = provider_candidates(view);

        if !self.provider.is_available() {
            tracing::debug!(route_id = %view.id(), "Directions provider has no credential, skipping");
            for (step, _) in candidates {
                attempts.push(Attempt {
                    step,
                    outcome: AttemptOutcome::Skipped("provider unavailable".to_string()),
                });
            }
            return None;
        }

        let mut unreachable = false;
        for (step, request) in candidates {
            if unreachable {
                attempts.push(Attempt {
                    step,
                    outcome: AttemptOutcome::Skipped("provider unreachable".to_string()),
                });
                continue;
            }
            let Some(request) = request else {
                attempts.push(Attempt {
                    step,
                    outcome: AttemptOutcome::Skipped("origin or destination missing".to_string()),
                });
                continue;
            };

            match self.query(view, step, &request, attempts).await {
                ProviderPhase::Resolved(points) => return Some(points),
                ProviderPhase::Continue => {}
                ProviderPhase::Unreachable => unreachable = true,
            }
        }

        None
    }

    async fn query(
        &self,
        view: &RouteView,
        step: ResolutionStep,
        request: &DirectionsRequest,
        attempts: &mut Vec<Attempt>,
    ) -> ProviderPhase {
        tracing::debug!(
            route_id = %view.id(),
            step = %step,
            origin = %request.origin.to_query_value(),
            destination = %request.destination.to_query_value(),
            "Requesting directions"
        );

        match self.fetch_provider_path(request).await {
            Ok(points) if points.is_empty() => {
                attempts.push(Attempt {
                    step,
                    outcome: AttemptOutcome::Empty,
                });
                ProviderPhase::Continue
            }
            Ok(points) => {
                attempts.push(Attempt {
                    step,
                    outcome: AttemptOutcome::Resolved(points.len()),
                });
                tracing::info!(
                    route_id = %view.id(),
                    step = %step,
                    points = points.len(),
                    "Resolved geometry from directions provider"
                );
                ProviderPhase::Resolved(points)
            }
            Err(e) => {
                tracing::warn!(route_id = %view.id(), step = %step, error = %e, "Directions attempt failed");
                let unreachable = matches!(e, TrackerError::ProviderUnavailable { .. });
                attempts.push(Attempt {
                    step,
                    outcome: AttemptOutcome::Failed(e.to_string()),
                });
                if unreachable {
                    ProviderPhase::Unreachable
                } else {
                    ProviderPhase::Continue
                }
            }
        }
    }
}

/// Provider requests in priority order; `None` when the step lacks data.
fn provider_candidates(view: &RouteView) -> Vec<(ResolutionStep, Option<DirectionsRequest>)> {
    let route = &view.route;

    let route_endpoints = route.start.zip(route.end).map(|(start, end)| DirectionsRequest {
        origin: Waypoint::Coordinate(start),
        destination: Waypoint::Coordinate(end),
    });

    let stage_endpoints = match view.stages.as_slice() {
        [first, .., last] => Some(DirectionsRequest {
            origin: Waypoint::Coordinate(first.location),
            destination: Waypoint::Coordinate(last.location),
        }),
        _ => None,
    };

    let labels = (!route.start_label.trim().is_empty() && !route.end_label.trim().is_empty())
        .then(|| DirectionsRequest {
            origin: Waypoint::Place(route.start_label.clone()),
            destination: Waypoint::Place(route.end_label.clone()),
        });

    vec![
        (ResolutionStep::ProviderRouteEndpoints, route_endpoints),
        (ResolutionStep::ProviderStageEndpoints, stage_endpoints),
        (ResolutionStep::ProviderPlaceLabels, labels),
    ]
}
