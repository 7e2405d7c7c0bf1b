//! XSLT instructions.
//!
//! | Module | Instructions |
//! |---|---|
//! | [`block`] | sequence constructors |
//! | [`choose`] | `xsl:choose`, `xsl:if` |
//! | [`for_each`] | `xsl:for-each` |
//! | [`for_each_group`] | `xsl:for-each-group` and its grouping algorithms |
//! | [`templates`] | templates, `xsl:apply-templates`, `xsl:apply-imports`, `xsl:next-match`, `xsl:call-template`, `xsl:with-param` |
//! | [`nodes`] | node constructors, `xsl:copy`, `xsl:copy-of`, `xsl:value-of` |
//! | [`variables`] | global variables and parameters, `xsl:variable`, `xsl:param` |
//! | [`message`] | `xsl:message` and message listeners |
//! | [`attribute_sets`] | `xsl:attribute-set`, `use-attribute-sets` |
//! | [`user_function`] | `xsl:function` |
//! | [`result_document`] | `xsl:result-document` |
pub mod attribute_sets;
pub mod block;
pub mod choose;
pub mod for_each;
pub mod for_each_group;
pub mod message;
pub mod nodes;
pub mod result_document;
pub mod templates;
pub mod user_function;
pub mod variables;
