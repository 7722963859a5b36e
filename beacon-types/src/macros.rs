/// Implements `Serialize` and `Deserialize` through `Display` and `FromStr`.
macro_rules! impl_str_serde {
    ($type:ty) => {
        impl ::serde::ser::Serialize for $type {
            fn serialize<S: ::serde::ser::Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> ::serde::de::Deserialize<'de> for $type {
            fn deserialize<D: ::serde::de::Deserializer<'de>>(
                deserializer: D,
            ) -> Result<$type, D::Error> {
                <::std::borrow::Cow<'_, str> as ::serde::de::Deserialize>::deserialize(
                    deserializer,
                )?
                .parse()
                .map_err(::serde::de::Error::custom)
            }
        }
    };
}
