//! Static Rapier collision scene that character motors sweep and probe against.
#![forbid(unsafe_code)]

use log::debug;
use rapier3d::prelude::*;

/// Narrows a scene query by collision-group membership and collider tag.
///
/// Tags live in `Collider::user_data`. Sensors are skipped unless
/// `include_sensors` is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceQuery {
    pub layers: u32,
    pub tag: Option<u64>,
    pub include_sensors: bool,
}

impl SurfaceQuery {
    pub const SOLID: Self = Self {
        layers: u32::MAX,
        tag: None,
        include_sensors: false,
    };

    pub fn new(layers: u32, tag: Option<u64>) -> Self {
        Self {
            layers,
            tag,
            include_sensors: false,
        }
    }

    pub fn with_sensors(mut self) -> Self {
        self.include_sensors = true;
        self
    }

    fn groups(&self) -> InteractionGroups {
        InteractionGroups::new(Group::ALL, Group::from_bits_truncate(self.layers))
    }

    fn accepts(&self, collider: &Collider) -> bool {
        self.tag
            .map(|tag| collider.user_data == tag as u128)
            .unwrap_or(true)
    }
}

impl Default for SurfaceQuery {
    fn default() -> Self {
        Self::SOLID
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub collider: ColliderHandle,
    pub normal: Vector<Real>,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    query_pipeline: QueryPipeline,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector<Real>) -> Self {
        Self {
            gravity,
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    pub fn bodies(&self) -> &RigidBodySet {
        &self.bodies
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn query_pipeline(&self) -> &QueryPipeline {
        &self.query_pipeline
    }

    /// Opposite of gravity, or `+Y` in zero gravity.
    pub fn world_up(&self) -> Vector<Real> {
        if self.gravity.norm_squared() > 1.0e-6 {
            -self.gravity.normalize()
        } else {
            Vector::y()
        }
    }

    /// Rebuilds the query acceleration structure. Call after editing the scene.
    pub fn refresh(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    pub fn insert_static_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.colliders.insert(collider)
    }

    /// Inserts a collider that belongs to `layers` and carries `tag` for probe filters.
    pub fn insert_tagged_collider(
        &mut self,
        mut collider: Collider,
        layers: u32,
        tag: u64,
    ) -> ColliderHandle {
        collider.user_data = tag as u128;
        collider.set_collision_groups(InteractionGroups::new(
            Group::from_bits_truncate(layers),
            Group::ALL,
        ));
        let handle = self.colliders.insert(collider);
        debug!("tagged collider {:?} (layers {:#x}, tag {:#x})", handle, layers, tag);
        handle
    }

    pub fn cast_ray(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_toi: Real,
        query: SurfaceQuery,
    ) -> Option<RayHit> {
        let predicate = |_: ColliderHandle, collider: &Collider| query.accepts(collider);
        let filter = Self::filter(query).predicate(&predicate);
        let ray = Ray::new(origin, direction);
        // Retry as hollow so rays starting inside a collider still report its surface.
        let (collider, hit) = self
            .query_pipeline
            .cast_ray_and_get_normal(&self.bodies, &self.colliders, &ray, max_toi, true, filter)
            .or_else(|| {
                self.query_pipeline.cast_ray_and_get_normal(
                    &self.bodies,
                    &self.colliders,
                    &ray,
                    max_toi,
                    false,
                    filter,
                )
            })?;
        Some(RayHit {
            collider,
            normal: hit.normal,
        })
    }

    pub fn intersection_with_shape(
        &self,
        position: &Isometry<Real>,
        shape: &dyn Shape,
        query: SurfaceQuery,
    ) -> Option<ColliderHandle> {
        let predicate = |_: ColliderHandle, collider: &Collider| query.accepts(collider);
        let filter = Self::filter(query).predicate(&predicate);
        self.query_pipeline.intersection_with_shape(
            &self.bodies,
            &self.colliders,
            position,
            shape,
            filter,
        )
    }

    pub fn intersections_with_shape(
        &self,
        position: &Isometry<Real>,
        shape: &dyn Shape,
        query: SurfaceQuery,
    ) -> Vec<ColliderHandle> {
        let predicate = |_: ColliderHandle, collider: &Collider| query.accepts(collider);
        let filter = Self::filter(query).predicate(&predicate);
        let mut hits = Vec::new();
        self.query_pipeline.intersections_with_shape(
            &self.bodies,
            &self.colliders,
            position,
            shape,
            filter,
            |handle| {
                hits.push(handle);
                true
            },
        );
        hits
    }

    fn filter<'a>(query: SurfaceQuery) -> QueryFilter<'a> {
        let filter = QueryFilter::default().groups(query.groups());
        if query.include_sensors {
            filter
        } else {
            filter.exclude_sensors()
        }
    }
}
