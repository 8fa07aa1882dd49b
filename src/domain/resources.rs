//! Addressing for the remote content service.

use std::fmt;

/// Well-known collections exposed by the content service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Posts,
    Users,
    Comments,
    Photos,
    Albums,
    Todos,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Posts => "posts",
            Resource::Users => "users",
            Resource::Comments => "comments",
            Resource::Photos => "photos",
            Resource::Albums => "albums",
            Resource::Todos => "todos",
        }
    }
}

/// A path relative to the service base: `/posts`, `/posts/5`,
/// `/users/3/posts`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    parent: Option<(Resource, u32)>,
    resource: Resource,
    id: Option<u32>,
}

impl ResourcePath {
    pub fn collection(resource: Resource) -> Self {
        Self {
            parent: None,
            resource,
            id: None,
        }
    }

    pub fn item(resource: Resource, id: u32) -> Self {
        Self {
            parent: None,
            resource,
            id: Some(id),
        }
    }

    pub fn scoped(parent: Resource, parent_id: u32, resource: Resource) -> Self {
        Self {
            parent: Some((parent, parent_id)),
            resource,
            id: None,
        }
    }

    /// Collection scoped by an optional parent; unscoped when `parent_id` is `None`.
    pub fn maybe_scoped(parent: Resource, parent_id: Option<u32>, resource: Resource) -> Self {
        match parent_id {
            Some(id) => Self::scoped(parent, id, resource),
            None => Self::collection(resource),
        }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((parent, parent_id)) = self.parent {
            write!(f, "/{}/{}", parent.as_str(), parent_id)?;
        }
        write!(f, "/{}", self.resource.as_str())?;
        if let Some(id) = self.id {
            write!(f, "/{id}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_paths() {
        assert_eq!(ResourcePath::collection(Resource::Posts).to_string(), "/posts");
        assert_eq!(ResourcePath::item(Resource::Users, 3).to_string(), "/users/3");
        assert_eq!(
            ResourcePath::scoped(Resource::Posts, 7, Resource::Comments).to_string(),
            "/posts/7/comments"
        );
        assert_eq!(
            ResourcePath::maybe_scoped(Resource::Albums, Some(1), Resource::Photos).to_string(),
            "/albums/1/photos"
        );
        assert_eq!(
            ResourcePath::maybe_scoped(Resource::Users, None, Resource::Todos).to_string(),
            "/todos"
        );
    }
}
