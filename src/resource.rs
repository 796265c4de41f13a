//! Resource dictionaries of content streams.
//!
//! While drawing, a content stream only knows the handles of the objects it uses.
//! Each handle is mapped to a short resource name like `/f0` or `/x3` the first time
//! it is used. The names only become references to actual objects once the
//! document is serialized and every handle has been assigned its object number.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use pdf_writer::types::ProcSet;
use pdf_writer::writers::{FormXObject, Page, Resources, TilingPattern};
use pdf_writer::{Dict, Finish, Name, Ref};

use crate::color::ColorSpace;
use crate::error::{CapyError, CapyResult};
use crate::handle::{
    FontId, FormXObjectId, GraphicsStateId, ImageId, OptionalContentGroupId, PatternId, ShadingId,
    TransparencyGroupId,
};
use crate::serialize::SerializeContext;
use crate::util::NameExt;

pub(crate) trait ResourceTrait: Sized {
    type Key: Copy + Eq + Hash + Debug;

    fn get_dict<'a>(resources: &'a mut Resources) -> Dict<'a>;
    fn get_prefix() -> &'static str;
    fn get_mapper(b: &mut ResourceDictionaryBuilder) -> &mut ResourceMapper<Self>;
    fn resolve(key: Self::Key, sc: &SerializeContext) -> CapyResult<Ref>;
}

#[derive(Debug, Eq, PartialEq, Hash, Default, Clone)]
pub(crate) struct ExtGState;

impl ResourceTrait for ExtGState {
    type Key = GraphicsStateId;

    fn get_dict<'a>(resources: &'a mut Resources) -> Dict<'a> {
        resources.ext_g_states()
    }

    fn get_prefix() -> &'static str {
        "g"
    }

    fn get_mapper(b: &mut ResourceDictionaryBuilder) -> &mut ResourceMapper<Self> {
        &mut b.ext_g_states
    }

    fn resolve(key: Self::Key, sc: &SerializeContext) -> CapyResult<Ref> {
        sc.refs.graphics_states.get(key)
    }
}

#[derive(Debug, Eq, PartialEq, Hash, Default, Clone)]
pub(crate) struct ColorSpaceResource;

impl ResourceTrait for ColorSpaceResource {
    type Key = ColorSpace;

    fn get_dict<'a>(resources: &'a mut Resources) -> Dict<'a> {
        resources.color_spaces()
    }

    fn get_prefix() -> &'static str {
        "c"
    }

    fn get_mapper(b: &mut ResourceDictionaryBuilder) -> &mut ResourceMapper<Self> {
        &mut b.color_spaces
    }

    fn resolve(key: Self::Key, sc: &SerializeContext) -> CapyResult<Ref> {
        match key {
            ColorSpace::Icc(id) => sc.refs.icc_color_spaces.get(id),
            ColorSpace::Lab(id) => sc.refs.lab_color_spaces.get(id),
            ColorSpace::Separation(id) => sc.refs.separations.get(id),
            ColorSpace::Device(_) | ColorSpace::Pattern => Err(CapyError::SerializationFailure(
                format!("{} is not a colorspace resource", key.kind()),
            )),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Hash, Default, Clone)]
pub(crate) struct Shading;

impl ResourceTrait for Shading {
    type Key = ShadingId;

    fn get_dict<'a>(resources: &'a mut Resources) -> Dict<'a> {
        resources.shadings()
    }

    fn get_prefix() -> &'static str {
        "s"
    }

    fn get_mapper(b: &mut ResourceDictionaryBuilder) -> &mut ResourceMapper<Self> {
        &mut b.shadings
    }

    fn resolve(key: Self::Key, sc: &SerializeContext) -> CapyResult<Ref> {
        sc.refs.shadings.get(key)
    }
}

/// Anything that can be invoked with the `Do` operator.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) enum XObjectKey {
    Image(ImageId),
    Form(FormXObjectId),
    Group(TransparencyGroupId),
}

#[derive(Debug, Eq, PartialEq, Hash, Default, Clone)]
pub(crate) struct XObject;

impl ResourceTrait for XObject {
    type Key = XObjectKey;

    fn get_dict<'a>(resources: &'a mut Resources) -> Dict<'a> {
        resources.x_objects()
    }

    fn get_prefix() -> &'static str {
        "x"
    }

    fn get_mapper(b: &mut ResourceDictionaryBuilder) -> &mut ResourceMapper<Self> {
        &mut b.x_objects
    }

    fn resolve(key: Self::Key, sc: &SerializeContext) -> CapyResult<Ref> {
        match key {
            XObjectKey::Image(id) => sc.refs.images.get(id),
            XObjectKey::Form(id) => sc.refs.form_xobjects.get(id),
            XObjectKey::Group(id) => sc.refs.transparency_groups.get(id),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Hash, Default, Clone)]
pub(crate) struct Pattern;

impl ResourceTrait for Pattern {
    type Key = PatternId;

    fn get_dict<'a>(resources: &'a mut Resources) -> Dict<'a> {
        resources.patterns()
    }

    fn get_prefix() -> &'static str {
        "p"
    }

    fn get_mapper(b: &mut ResourceDictionaryBuilder) -> &mut ResourceMapper<Self> {
        &mut b.patterns
    }

    fn resolve(key: Self::Key, sc: &SerializeContext) -> CapyResult<Ref> {
        sc.refs.patterns.get(key)
    }
}

#[derive(Debug, Eq, PartialEq, Hash, Default, Clone)]
pub(crate) struct Font;

impl ResourceTrait for Font {
    type Key = FontId;

    fn get_dict<'a>(resources: &'a mut Resources) -> Dict<'a> {
        resources.fonts()
    }

    fn get_prefix() -> &'static str {
        "f"
    }

    fn get_mapper(b: &mut ResourceDictionaryBuilder) -> &mut ResourceMapper<Self> {
        &mut b.fonts
    }

    fn resolve(key: Self::Key, sc: &SerializeContext) -> CapyResult<Ref> {
        sc.refs.fonts.get(key)
    }
}

#[derive(Debug, Eq, PartialEq, Hash, Default, Clone)]
pub(crate) struct Properties;

impl ResourceTrait for Properties {
    type Key = OptionalContentGroupId;

    fn get_dict<'a>(resources: &'a mut Resources) -> Dict<'a> {
        resources.insert(Name(b"Properties")).dict()
    }

    fn get_prefix() -> &'static str {
        "oc"
    }

    fn get_mapper(b: &mut ResourceDictionaryBuilder) -> &mut ResourceMapper<Self> {
        &mut b.properties
    }

    fn resolve(key: Self::Key, sc: &SerializeContext) -> CapyResult<Ref> {
        sc.refs.optional_content_groups.get(key)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ResourceDictionaryBuilder {
    pub(crate) color_spaces: ResourceMapper<ColorSpaceResource>,
    pub(crate) ext_g_states: ResourceMapper<ExtGState>,
    pub(crate) patterns: ResourceMapper<Pattern>,
    pub(crate) x_objects: ResourceMapper<XObject>,
    pub(crate) shadings: ResourceMapper<Shading>,
    pub(crate) fonts: ResourceMapper<Font>,
    pub(crate) properties: ResourceMapper<Properties>,
}

impl ResourceDictionaryBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Return the resource name of the object, registering it if necessary.
    pub(crate) fn register_resource<V>(&mut self, key: V::Key) -> String
    where
        V: ResourceTrait,
    {
        V::get_mapper(self).remap_with_name(key)
    }

    pub(crate) fn finish(self) -> ResourceDictionary {
        ResourceDictionary {
            color_spaces: self.color_spaces.into_resource_list(),
            ext_g_states: self.ext_g_states.into_resource_list(),
            patterns: self.patterns.into_resource_list(),
            x_objects: self.x_objects.into_resource_list(),
            shadings: self.shadings.into_resource_list(),
            fonts: self.fonts.into_resource_list(),
            properties: self.properties.into_resource_list(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ResourceDictionary {
    pub(crate) color_spaces: ResourceList<ColorSpaceResource>,
    pub(crate) ext_g_states: ResourceList<ExtGState>,
    pub(crate) patterns: ResourceList<Pattern>,
    pub(crate) x_objects: ResourceList<XObject>,
    pub(crate) shadings: ResourceList<Shading>,
    pub(crate) fonts: ResourceList<Font>,
    pub(crate) properties: ResourceList<Properties>,
}

impl ResourceDictionary {
    pub(crate) fn to_pdf_resources<T>(
        &self,
        sc: &SerializeContext,
        parent: &mut T,
    ) -> CapyResult<()>
    where
        T: ResourcesExt,
    {
        let resources = &mut parent.resources();
        resources.proc_sets([
            ProcSet::Pdf,
            ProcSet::Text,
            ProcSet::ImageColor,
            ProcSet::ImageGrayscale,
        ]);
        write_resource_type(sc, resources, &self.color_spaces)?;
        write_resource_type(sc, resources, &self.ext_g_states)?;
        write_resource_type(sc, resources, &self.patterns)?;
        write_resource_type(sc, resources, &self.x_objects)?;
        write_resource_type(sc, resources, &self.shadings)?;
        write_resource_type(sc, resources, &self.fonts)?;
        write_resource_type(sc, resources, &self.properties)?;

        Ok(())
    }
}

fn write_resource_type<T>(
    sc: &SerializeContext,
    resources: &mut Resources,
    resource_list: &ResourceList<T>,
) -> CapyResult<()>
where
    T: ResourceTrait,
{
    if !resource_list.is_empty() {
        let mut dict = T::get_dict(resources);

        for (name, key) in resource_list.get_entries() {
            dict.pair(name.to_pdf_name(), T::resolve(key, sc)?);
        }

        dict.finish();
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub(crate) struct ResourceList<V: ResourceTrait> {
    entries: Vec<V::Key>,
}

impl<V: ResourceTrait> Default for ResourceList<V> {
    fn default() -> Self {
        Self { entries: vec![] }
    }
}

impl<T> ResourceList<T>
where
    T: ResourceTrait,
{
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get_entries(&self) -> impl Iterator<Item = (String, T::Key)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, k)| (name_from_number::<T>(i as ResourceNumber), *k))
    }
}

#[derive(Debug)]
pub(crate) struct ResourceMapper<T: ResourceTrait> {
    forward: Vec<T::Key>,
    backward: HashMap<T::Key, ResourceNumber>,
    phantom: PhantomData<T>,
}

impl<T: ResourceTrait> Default for ResourceMapper<T> {
    fn default() -> Self {
        Self {
            forward: Vec::new(),
            backward: HashMap::new(),
            phantom: PhantomData,
        }
    }
}

impl<T> ResourceMapper<T>
where
    T: ResourceTrait,
{
    pub(crate) fn remap(&mut self, key: T::Key) -> ResourceNumber {
        let forward = &mut self.forward;
        let backward = &mut self.backward;

        *backward.entry(key).or_insert_with(|| {
            let old = forward.len();
            forward.push(key);
            old as ResourceNumber
        })
    }

    pub(crate) fn remap_with_name(&mut self, key: T::Key) -> String {
        name_from_number::<T>(self.remap(key))
    }

    pub(crate) fn into_resource_list(self) -> ResourceList<T> {
        ResourceList {
            entries: self.forward,
        }
    }
}

fn name_from_number<T: ResourceTrait>(num: ResourceNumber) -> String {
    format!("{}{}", T::get_prefix(), num)
}

pub(crate) type ResourceNumber = u32;

/// A trait for getting the resource dictionary of an object.
pub(crate) trait ResourcesExt {
    /// Return the resources dictionary of the object.
    fn resources(&mut self) -> Resources<'_>;
}

impl ResourcesExt for FormXObject<'_> {
    fn resources(&mut self) -> Resources<'_> {
        self.resources()
    }
}

impl ResourcesExt for TilingPattern<'_> {
    fn resources(&mut self) -> Resources<'_> {
        self.resources()
    }
}

impl ResourcesExt for Page<'_> {
    fn resources(&mut self) -> Resources<'_> {
        self.resources()
    }
}
